use anyhow::Result;
use serde::Deserialize;

use crate::relay::CodecParameters;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub recording: RecordingConfig,
    #[serde(default)]
    pub nats: Option<NatsConfig>,
    #[serde(default)]
    pub ingest: Vec<IngestConfig>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct RecordingConfig {
    /// Root directory; each room records into its own subdirectory
    pub directory: String,
}

#[derive(Debug, Deserialize)]
pub struct NatsConfig {
    pub url: String,
}

/// A producer connection fed by plain RTP over UDP.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    pub room: String,
    pub connection: String,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_ingest_bind")]
    pub bind: String,
    pub tracks: Vec<IngestTrackConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestTrackConfig {
    pub mime_type: String,
    pub clock_rate: u32,
    #[serde(default)]
    pub channels: u16,
    pub port: u16,
}

impl IngestTrackConfig {
    pub fn codec(&self) -> CodecParameters {
        CodecParameters::new(self.mime_type.clone(), self.clock_rate, self.channels)
    }
}

fn default_ingest_bind() -> String {
    "0.0.0.0".to_string()
}

impl Config {
    /// Load from a config file (any format the `config` crate knows, by
    /// extension), with `RECORDER__SECTION__KEY` environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("RECORDER").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(contents, config::FileFormat::Toml))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[service]
name = "webm-recorder"

[service.http]
bind = "127.0.0.1"
port = 8443

[recording]
directory = "/var/lib/recordings"

[[ingest]]
room = "standup"
connection = "alice-cam"
label = "alice"

[[ingest.tracks]]
mime_type = "audio/opus"
clock_rate = 48000
channels = 2
port = 5004

[[ingest.tracks]]
mime_type = "video/VP8"
clock_rate = 90000
port = 5006
"#;

    #[test]
    fn test_parse_sample_config() {
        let cfg = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.service.http.port, 8443);
        assert_eq!(cfg.recording.directory, "/var/lib/recordings");
        assert!(cfg.nats.is_none());

        assert_eq!(cfg.ingest.len(), 1);
        let ingest = &cfg.ingest[0];
        assert_eq!(ingest.bind, "0.0.0.0");
        assert_eq!(ingest.tracks.len(), 2);
        assert_eq!(ingest.tracks[0].codec(), CodecParameters::opus());
        assert_eq!(ingest.tracks[1].codec(), CodecParameters::vp8());
    }
}
