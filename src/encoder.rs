//! Builds the encoder command line.
//!
//! The encoder is treated as an opaque child: we hand it an argument vector
//! and an output URL and only look at its diagnostic stream afterwards.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// What gets pushed to the ingest endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamSource {
    /// A video file looped forever.
    LoopedVideo { path: PathBuf },
    /// A still image, with an optional looped audio track.
    StaticImage {
        image: PathBuf,
        #[serde(default)]
        audio: Option<PathBuf>,
    },
    /// Synthetic solid-colour video, with silence unless audio is given.
    SolidColor {
        #[serde(default = "default_color")]
        color: String,
        #[serde(default = "default_size")]
        size: String,
        #[serde(default)]
        audio: Option<PathBuf>,
    },
    /// A concat-demuxer playlist of audio files over an image or black video.
    AudioPlaylist {
        playlist: PathBuf,
        #[serde(default)]
        image: Option<PathBuf>,
    },
}

impl Default for StreamSource {
    fn default() -> Self {
        StreamSource::LoopedVideo {
            path: PathBuf::from("video.mp4"),
        }
    }
}

fn default_color() -> String {
    "black".into()
}

fn default_size() -> String {
    "1280x720".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    pub binary: String,
    pub preset: String,
    pub video_bitrate: String,
    pub max_rate: String,
    pub buffer_size: String,
    pub gop: u32,
    pub fps: u32,
    pub audio_bitrate: String,
    pub sample_rate: u32,
    /// Arguments inserted right before the output format.
    pub extra_args: Vec<String>,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            binary: "ffmpeg".into(),
            preset: "veryfast".into(),
            video_bitrate: "1000k".into(),
            max_rate: "1000k".into(),
            buffer_size: "2000k".into(),
            gop: 50,
            fps: 25,
            audio_bitrate: "128k".into(),
            sample_rate: 44100,
            extra_args: Vec::new(),
        }
    }
}

/// A ready-to-spawn encoder invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderCommand {
    pub program: String,
    pub args: Vec<String>,
    inputs: Vec<PathBuf>,
    secret: String,
}

impl EncoderCommand {
    pub fn build(
        settings: &EncoderSettings,
        source: &StreamSource,
        ingest_url: &str,
        stream_key: &str,
    ) -> Self {
        let mut args = Args::default();
        let mut inputs = Vec::new();
        args.push(["-hide_banner", "-loglevel", "level+info"]);

        let has_audio = match source {
            StreamSource::LoopedVideo { path } => {
                args.push(["-re", "-stream_loop", "-1", "-i"]);
                args.path(path);
                inputs.push(path.clone());
                true
            }
            StreamSource::StaticImage { image, audio } => {
                args.push(["-re", "-loop", "1"]);
                args.push(["-framerate".to_string(), settings.fps.to_string()]);
                args.push(["-i"]);
                args.path(image);
                inputs.push(image.clone());
                audio_input(&mut args, &mut inputs, audio.as_deref())
            }
            StreamSource::SolidColor { color, size, audio } => {
                args.push(["-re", "-f", "lavfi", "-i"]);
                args.push([format!("color=c={color}:s={size}:r={}", settings.fps)]);
                audio_input(&mut args, &mut inputs, audio.as_deref())
            }
            StreamSource::AudioPlaylist { playlist, image } => {
                match image {
                    Some(image) => {
                        args.push(["-re", "-loop", "1"]);
                        args.push(["-framerate".to_string(), settings.fps.to_string()]);
                        args.push(["-i"]);
                        args.path(image);
                        inputs.push(image.clone());
                    }
                    None => {
                        args.push(["-re", "-f", "lavfi", "-i"]);
                        args.push([format!("color=c=black:s=1280x720:r={}", settings.fps)]);
                    }
                }
                args.push(["-f", "concat", "-safe", "0", "-stream_loop", "-1", "-i"]);
                args.path(playlist);
                inputs.push(playlist.clone());
                args.push(["-map", "0:v", "-map", "1:a"]);
                true
            }
        };
        if !has_audio {
            args.push(["-f", "lavfi", "-i"]);
            args.push([format!(
                "anullsrc=channel_layout=stereo:sample_rate={}",
                settings.sample_rate
            )]);
            args.push(["-map", "0:v", "-map", "1:a"]);
        }

        args.push(["-c:v", "libx264", "-preset"]);
        args.push([
            settings.preset.clone(),
            "-b:v".into(),
            settings.video_bitrate.clone(),
            "-maxrate".into(),
            settings.max_rate.clone(),
            "-bufsize".into(),
            settings.buffer_size.clone(),
        ]);
        args.push(["-pix_fmt", "yuv420p", "-g"]);
        args.push([settings.gop.to_string()]);
        args.push(["-c:a", "aac", "-b:a"]);
        args.push([
            settings.audio_bitrate.clone(),
            "-ar".into(),
            settings.sample_rate.to_string(),
        ]);
        args.push(settings.extra_args.iter().cloned());
        args.push(["-f", "flv"]);
        args.push([ingest_target(ingest_url, stream_key)]);

        Self {
            program: settings.binary.clone(),
            args: args.0,
            inputs,
            secret: stream_key.to_string(),
        }
    }

    /// The command line with the stream key masked, for logs.
    pub fn display(&self) -> String {
        let mut parts: Vec<String> = std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect();
        if !self.secret.is_empty() {
            if let Some(target) = parts.last_mut() {
                if let Some(base) = target.strip_suffix(self.secret.as_str()) {
                    *target = format!("{base}****");
                }
            }
        }
        parts.join(" ")
    }

    /// Input files the encoder will open.
    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    pub fn missing_assets(&self) -> Vec<PathBuf> {
        self.inputs
            .iter()
            .filter(|path| !path.exists())
            .cloned()
            .collect()
    }
}

#[derive(Default)]
struct Args(Vec<String>);

impl Args {
    fn push<I, S>(&mut self, items: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.extend(items.into_iter().map(Into::into));
    }

    fn path(&mut self, path: &Path) {
        self.0.push(path.to_string_lossy().into_owned());
    }
}

fn audio_input(args: &mut Args, inputs: &mut Vec<PathBuf>, audio: Option<&Path>) -> bool {
    let Some(audio) = audio else {
        return false;
    };
    args.push(["-stream_loop", "-1", "-i"]);
    args.path(audio);
    inputs.push(audio.to_path_buf());
    args.push(["-map", "0:v", "-map", "1:a", "-shortest"]);
    true
}

fn ingest_target(ingest_url: &str, stream_key: &str) -> String {
    format!("{}/{}", ingest_url.trim_end_matches('/'), stream_key)
}
