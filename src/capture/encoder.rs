//! FFmpeg capture sink
//!
//! Streams raw RGBA frames to an `ffmpeg` child process over stdin and lets
//! it compose the mp4 artifact. Closing drops stdin to signal EOF and waits
//! for the encoder to flush.

use crate::capture::traits::{CaptureError, CaptureResult, CaptureSink, Frame, PixelOrder};
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread;

/// How much trailing stderr output is kept for the close error message
const STDERR_TAIL_BYTES: usize = 8 * 1024;

/// A spawned encoder process with its stdin handle and stderr drain
struct RunningEncoder {
    child: Child,
    stdin: ChildStdin,
    stderr_tail: thread::JoinHandle<String>,
}

/// Capture sink backed by an `ffmpeg` child process
pub struct FfmpegSink {
    program: String,
    process: Option<RunningEncoder>,
    frame_count: u64,
}

impl FfmpegSink {
    pub fn new() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            process: None,
            frame_count: 0,
        }
    }

    #[cfg(test)]
    fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            process: None,
            frame_count: 0,
        }
    }

    /// Whether `ffmpeg` is runnable on this machine
    pub fn is_available() -> bool {
        Command::new("ffmpeg")
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl Default for FfmpegSink {
    fn default() -> Self {
        Self::new()
    }
}

fn encoder_args(path: &Path, width: u32, height: u32, fps: u32) -> Vec<String> {
    vec![
        "-y".to_string(),
        // Progress stats on stderr would fill the pipe on long recordings
        "-nostats".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgba".to_string(),
        "-s".to_string(),
        format!("{}x{}", width, height),
        "-r".to_string(),
        fps.to_string(),
        "-i".to_string(),
        "-".to_string(), // stdin for video frames
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-crf".to_string(),
        "28".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        path.to_string_lossy().to_string(),
    ]
}

impl CaptureSink for FfmpegSink {
    fn open(&mut self, path: &Path, width: u32, height: u32, fps: u32) -> CaptureResult<()> {
        if self.process.is_some() {
            return Err(CaptureError::SinkOpen("sink already open".to_string()));
        }

        let args = encoder_args(path, width, height, fps);
        tracing::info!("Starting FFmpeg capture sink: {:?}", args);

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CaptureError::SinkOpen(format!("failed to start ffmpeg: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CaptureError::SinkOpen("failed to capture ffmpeg stdin".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| CaptureError::SinkOpen("failed to capture ffmpeg stderr".to_string()))?;

        // Drain stderr continuously; if the pipe fills, ffmpeg blocks on it
        // and stops reading stdin, wedging every subsequent append
        let stderr_tail = thread::spawn(move || {
            let mut tail = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                match stderr.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        tail.extend_from_slice(&buf[..n]);
                        if tail.len() > STDERR_TAIL_BYTES {
                            let cut = tail.len() - STDERR_TAIL_BYTES;
                            tail.drain(..cut);
                        }
                    }
                }
            }
            String::from_utf8_lossy(&tail).into_owned()
        });

        self.process = Some(RunningEncoder {
            child,
            stdin,
            stderr_tail,
        });
        self.frame_count = 0;
        Ok(())
    }

    fn append(&mut self, frame: &Frame) -> CaptureResult<()> {
        let running = self
            .process
            .as_mut()
            .ok_or_else(|| CaptureError::SinkWrite("sink is not open".to_string()))?;

        running
            .stdin
            .write_all(&frame.pixels)
            .map_err(|e| CaptureError::SinkWrite(format!("failed to write frame: {}", e)))?;
        self.frame_count += 1;
        Ok(())
    }

    fn close(&mut self) -> CaptureResult<()> {
        // Idempotent: a second close is a no-op
        let Some(running) = self.process.take() else {
            return Ok(());
        };

        // Close stdin to signal EOF, then wait for ffmpeg to flush the file
        let RunningEncoder {
            mut child,
            stdin,
            stderr_tail,
        } = running;
        drop(stdin);

        let status = child
            .wait()
            .map_err(|e| CaptureError::SinkClose(format!("failed to wait for ffmpeg: {}", e)))?;
        let stderr = stderr_tail.join().unwrap_or_else(|_| String::new());

        if !status.success() {
            return Err(CaptureError::SinkClose(format!(
                "ffmpeg exited with error: {}",
                stderr
            )));
        }

        tracing::info!("FFmpeg sink closed: {} frames written", self.frame_count);
        Ok(())
    }

    fn pixel_order(&self) -> PixelOrder {
        PixelOrder::Rgba
    }

    fn extension(&self) -> &'static str {
        "mp4"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_without_open_is_a_noop() {
        let mut sink = FfmpegSink::new();
        assert!(sink.close().is_ok());
        assert!(sink.close().is_ok());
    }

    #[test]
    fn append_without_open_fails() {
        let mut sink = FfmpegSink::new();
        let frame = Frame {
            pixels: vec![0; 4],
            width: 1,
            height: 1,
            order: PixelOrder::Rgba,
        };
        assert!(sink.append(&frame).is_err());
    }

    #[test]
    fn encoder_is_told_to_suppress_progress_stats() {
        let args = encoder_args(Path::new("/tmp/out.mp4"), 1920, 1080, 10);
        assert!(args.contains(&"-nostats".to_string()));
        let loglevel = args.iter().position(|a| a == "-loglevel");
        assert_eq!(args[loglevel.unwrap() + 1], "error");
    }

    /// A stderr-chatty encoder must not stall frame writes: the stand-in
    /// child spams far more stderr than a pipe buffer holds before it starts
    /// consuming stdin, and the appends pushed at it exceed a pipe buffer
    /// too, so an undrained stderr would wedge `append` permanently.
    #[cfg(unix)]
    #[test]
    fn stderr_chatter_does_not_stall_appends() {
        use std::os::unix::fs::PermissionsExt;
        use std::sync::mpsc;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("chatty-encoder.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             i=0\n\
             while [ $i -lt 4000 ]; do\n\
               printf 'frame=%d fps=0.0 q=28.0 size=0kB time=00:00:00.00 bitrate=N/A\\n' \"$i\" >&2\n\
               i=$((i+1))\n\
             done\n\
             cat > /dev/null\n",
        )
        .unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script, perms).unwrap();

        let out = dir.path().join("out.mp4");
        let program = script.to_string_lossy().to_string();

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut sink = FfmpegSink::with_program(program);
            let result = sink.open(&out, 8, 8, 10).and_then(|_| {
                let frame = Frame {
                    pixels: vec![0; 256],
                    width: 8,
                    height: 8,
                    order: PixelOrder::Rgba,
                };
                for _ in 0..600 {
                    sink.append(&frame)?;
                }
                sink.close()
            });
            let _ = tx.send(result);
        });

        let result = rx
            .recv_timeout(Duration::from_secs(10))
            .expect("sink wedged writing frames");
        result.unwrap();
    }
}
