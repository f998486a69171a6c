// =============================================================================
// FRAME STREAM - ONE FFMPEG PROCESS FEEDING SEQUENTIAL PLAYBACK
// =============================================================================
//
// While playing, a single ffmpeg process decodes forward from the play
// position at the clip's frame rate. A reader thread cuts its rawvideo output
// into frames and hands them over a bounded channel, so the decoder stays a
// few frames ahead of the playhead. The stream is dropped (and the process
// killed) on pause and restarted on every seek.
//
// =============================================================================

use image::RgbImage;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread;
use std::time::{Duration, Instant};

const BUFFERED_FRAMES: usize = 8;

/// Requests up to this far past the newest frame are served by reading on;
/// anything further goes back to single-frame extraction.
const LOOKAHEAD_SECONDS: f64 = 2.0;

type TimedFrame = (f64, RgbImage);

#[derive(Debug)]
pub enum StreamRead {
    Frame(RgbImage),
    /// Nothing decoded yet
    Pending,
    /// The process exited or its output broke off
    Ended,
}

pub struct FrameStream {
    child: Option<Child>,
    frames: Receiver<TimedFrame>,
    start: f64,
    frame_interval: f64,
    latest: Option<TimedFrame>,
    ended: bool,
}

impl FrameStream {
    pub fn spawn(ffmpeg: &Path, path: &Path, from: f64, fps: f64, width: u32, height: u32) -> io::Result<Self> {
        let from = from.max(0.0);
        let mut child = Command::new(ffmpeg)
            .arg("-ss").arg(format!("{:.3}", from))
            .arg("-i").arg(path)
            .arg("-map").arg("0:v:0")
            .arg("-f").arg("rawvideo")
            .arg("-pix_fmt").arg("rgb24")
            .arg("-s").arg(format!("{}x{}", width, height))
            .arg("-r").arg(format!("{:.3}", fps))
            .arg("-loglevel").arg("error")
            .arg("-nostdin")
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdout = child.stdout.take();
        let (sender, receiver) = mpsc::sync_channel(BUFFERED_FRAMES);
        let mut stream = Self::from_receiver(receiver, from, fps);
        stream.child = Some(child);

        let stdout = stdout.ok_or_else(|| io::Error::new(io::ErrorKind::Other, "FFmpeg stdout was not captured"))?;
        let interval = stream.frame_interval;
        thread::Builder::new()
            .name("frame-stream".to_string())
            .spawn(move || read_frames(stdout, sender, from, interval, width, height))?;

        log::debug!("Frame stream started at {:.3}s", from);
        Ok(stream)
    }

    fn from_receiver(frames: Receiver<TimedFrame>, start: f64, fps: f64) -> Self {
        Self {
            child: None,
            frames,
            start,
            frame_interval: if fps > 0.0 { 1.0 / fps } else { 0.04 },
            latest: None,
            ended: false,
        }
    }

    /// Makes `image` the frame at the stream's start, so the first requests
    /// have something to show before the process produces output.
    pub fn seed(&mut self, image: RgbImage) {
        if self.latest.is_none() {
            self.latest = Some((self.start, image));
        }
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    /// Whether a request for `timestamp` can be served by reading forward.
    pub fn covers(&self, timestamp: f64) -> bool {
        if self.ended {
            return false;
        }
        let head = self.latest.as_ref().map_or(self.start, |(t, _)| *t);
        timestamp >= head - self.frame_interval / 2.0 && timestamp <= head + LOOKAHEAD_SECONDS
    }

    /// Reads forward to the frame for `timestamp`, skipping older ones. Waits
    /// at most `wait`; when the decoder has not caught up by then, the newest
    /// frame so far stands in.
    pub fn read(&mut self, timestamp: f64, wait: Duration) -> StreamRead {
        let deadline = Instant::now() + wait;
        loop {
            if let Some((t, image)) = &self.latest {
                if *t >= timestamp - self.frame_interval / 2.0 {
                    return StreamRead::Frame(image.clone());
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.frames.recv_timeout(remaining) {
                Ok(frame) => self.latest = Some(frame),
                Err(RecvTimeoutError::Timeout) => {
                    return match &self.latest {
                        Some((_, image)) => StreamRead::Frame(image.clone()),
                        None => StreamRead::Pending,
                    };
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.ended = true;
                    return StreamRead::Ended;
                }
            }
        }
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            log::debug!("Stopping frame stream started at {:.3}s", self.start);
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn read_frames<R: Read>(
    mut reader: R,
    frames: SyncSender<TimedFrame>,
    from: f64,
    interval: f64,
    width: u32,
    height: u32,
) {
    let frame_size = (width as usize) * (height as usize) * 3;
    let mut index: u64 = 0;
    loop {
        let mut buffer = vec![0u8; frame_size];
        if let Err(e) = reader.read_exact(&mut buffer) {
            log::debug!("Frame stream ended after {} frames: {}", index, e);
            return;
        }
        let Some(image) = RgbImage::from_raw(width, height, buffer) else {
            return;
        };
        let timestamp = from + index as f64 * interval;
        if frames.send((timestamp, image)).is_err() {
            return;
        }
        index += 1;
    }
}
