use super::Prober;
use crate::error::{
    ExporterError,
    ProbeError,
};
use async_trait::async_trait;
use std::time::{
    Duration,
    Instant,
};

/// [`Prober`] issuing plain GET requests with a fixed timeout.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Result<Self, ExporterError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ExporterError::ProbeClient)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, url: &str) -> Result<Duration, (ProbeError, Duration)> {
        let started_at = Instant::now();
        let response = self.client.get(url).send().await;
        let elapsed = started_at.elapsed();

        match response {
            Ok(response) if response.status().is_success() => Ok(elapsed),
            Ok(response) => Err((ProbeError::Status(response.status().as_u16()), elapsed)),
            Err(err) if err.is_timeout() => Err((ProbeError::Timeout, elapsed)),
            Err(err) => Err((ProbeError::Transport(err.to_string()), elapsed)),
        }
    }
}
