use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Platform {
    Ios = 1,
    Android = 2,
}

#[derive(Debug, Error)]
#[error("unknown {what} code {code}")]
pub struct UnknownCode {
    pub what: &'static str,
    pub code: i64,
}

impl TryFrom<i64> for Platform {
    type Error = UnknownCode;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Platform::Ios),
            2 => Ok(Platform::Android),
            code => Err(UnknownCode { what: "platform", code }),
        }
    }
}

impl From<Platform> for i64 {
    fn from(platform: Platform) -> i64 {
        platform as i64
    }
}

/// One push registration per (user, platform).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub user_id: String,
    #[sqlx(try_from = "i64")]
    pub platform: Platform,
    pub token: String,
    pub notification_device_id: Option<String>,
    pub created: i64,
    pub modified: i64,
    #[serde(skip)]
    pub deleted: i64,
}

impl Device {
    pub fn new(user_id: impl Into<String>, platform: Platform, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            platform,
            token: token.into(),
            notification_device_id: None,
            created: 0,
            modified: 0,
            deleted: 0,
        }
    }

    pub fn with_notification_device_id(mut self, id: impl Into<String>) -> Self {
        self.notification_device_id = Some(id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_codes_are_stable() {
        assert_eq!(i64::from(Platform::Ios), 1);
        assert_eq!(i64::from(Platform::Android), 2);
        assert_eq!(Platform::try_from(2).unwrap(), Platform::Android);
        assert!(Platform::try_from(0).is_err());
    }

    #[test]
    fn device_serializes_platform_as_code() {
        let device = Device::new("u1", Platform::Ios, "t1");
        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["platform"], 1);
        assert_eq!(json["userId"], "u1");
        assert!(json.get("deleted").is_none());
    }
}
