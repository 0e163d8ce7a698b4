//! AWS-backed collaborators: Timestream for storage and query, SNS for alerts.

mod sns;
mod timestream;

pub use sns::SnsNotifier;
pub use timestream::{TimestreamQuery, TimestreamWriter};

use aws_config::BehaviorVersion;
use aws_types::region::Region;
use aws_types::SdkConfig;

pub async fn load_sdk_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}
