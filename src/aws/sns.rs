use crate::sink::{NotificationSink, NotifyError};
use async_trait::async_trait;
use aws_sdk_sns::error::DisplayErrorContext;
use aws_sdk_sns::Client as SnsClient;
use aws_types::SdkConfig;

#[derive(Clone, Debug)]
pub struct SnsNotifier {
    client: SnsClient,
}

impl SnsNotifier {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: SnsClient::new(config),
        }
    }
}

#[async_trait]
impl NotificationSink for SnsNotifier {
    async fn send(&self, destination: &str, message: &str) -> Result<String, NotifyError> {
        let output = self
            .client
            .publish()
            .topic_arn(destination)
            .message(message)
            .send()
            .await
            .map_err(|err| NotifyError::Delivery(DisplayErrorContext(&err).to_string()))?;
        Ok(output.message_id().unwrap_or_default().to_string())
    }
}
