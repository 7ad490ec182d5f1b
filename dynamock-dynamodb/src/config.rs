//! DynamoDB emulator settings

use serde::Deserialize;

/// Identity the emulator reports in ARNs
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DynamoDBConfig {
    pub region: String,
    pub account_id: String,
}

impl Default for DynamoDBConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            account_id: "000000000000".to_string(),
        }
    }
}

impl DynamoDBConfig {
    pub fn table_arn(&self, table_name: &str) -> String {
        format!(
            "arn:aws:dynamodb:{}:{}:table/{}",
            self.region, self.account_id, table_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_arn() {
        let config = DynamoDBConfig {
            region: "eu-west-1".to_string(),
            account_id: "123456789012".to_string(),
        };
        assert_eq!(
            config.table_arn("messages"),
            "arn:aws:dynamodb:eu-west-1:123456789012:table/messages"
        );
        assert_eq!(
            DynamoDBConfig::default().table_arn("t"),
            "arn:aws:dynamodb:us-east-1:000000000000:table/t"
        );
    }
}
