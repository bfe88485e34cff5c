//! 配信モデル
//!
//! CloudFront ディストリビューションと Origin Access Control の定義

use crate::error::{Result, StackError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// OAC の署名動作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SigningBehavior {
    #[default]
    Always,
    Never,
    NoOverride,
}

impl SigningBehavior {
    pub fn as_cfn(&self) -> &'static str {
        match self {
            SigningBehavior::Always => "always",
            SigningBehavior::Never => "never",
            SigningBehavior::NoOverride => "no-override",
        }
    }
}

impl FromStr for SigningBehavior {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "always" => Ok(SigningBehavior::Always),
            "never" => Ok(SigningBehavior::Never),
            "no-override" => Ok(SigningBehavior::NoOverride),
            _ => Err(StackError::UnknownValue {
                field: "signing behavior",
                value: s.to_string(),
            }),
        }
    }
}

/// OAC の署名プロトコル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningProtocol {
    #[default]
    SigV4,
}

impl SigningProtocol {
    pub fn as_cfn(&self) -> &'static str {
        match self {
            SigningProtocol::SigV4 => "sigv4",
        }
    }
}

impl FromStr for SigningProtocol {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sigv4" => Ok(SigningProtocol::SigV4),
            _ => Err(StackError::UnknownValue {
                field: "signing protocol",
                value: s.to_string(),
            }),
        }
    }
}

/// OAC が署名するオリジンの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OriginType {
    #[default]
    S3,
    MediaStore,
    Lambda,
}

impl OriginType {
    pub fn as_cfn(&self) -> &'static str {
        match self {
            OriginType::S3 => "s3",
            OriginType::MediaStore => "mediastore",
            OriginType::Lambda => "lambda",
        }
    }
}

impl FromStr for OriginType {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "s3" => Ok(OriginType::S3),
            "mediastore" => Ok(OriginType::MediaStore),
            "lambda" => Ok(OriginType::Lambda),
            _ => Err(StackError::UnknownValue {
                field: "origin type",
                value: s.to_string(),
            }),
        }
    }
}

/// Origin Access Control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginAccessControlSpec {
    pub id: String,
    pub name: String,
    pub origin_type: OriginType,
    pub signing_behavior: SigningBehavior,
    pub signing_protocol: SigningProtocol,
    pub description: Option<String>,
}

impl OriginAccessControlSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            origin_type: OriginType::default(),
            signing_behavior: SigningBehavior::default(),
            signing_protocol: SigningProtocol::default(),
            description: None,
        }
    }
}

/// ビューワーとの HTTP バージョン
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HttpVersion {
    #[serde(rename = "http1.1")]
    Http1_1,
    #[default]
    #[serde(rename = "http2")]
    Http2,
    #[serde(rename = "http2and3")]
    Http2And3,
    #[serde(rename = "http3")]
    Http3,
}

impl HttpVersion {
    pub fn as_cfn(&self) -> &'static str {
        match self {
            HttpVersion::Http1_1 => "http1.1",
            HttpVersion::Http2 => "http2",
            HttpVersion::Http2And3 => "http2and3",
            HttpVersion::Http3 => "http3",
        }
    }
}

impl FromStr for HttpVersion {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace(['_', '-'], "").as_str() {
            "http1.1" | "http11" => Ok(HttpVersion::Http1_1),
            "http2" => Ok(HttpVersion::Http2),
            "http2and3" => Ok(HttpVersion::Http2And3),
            "http3" => Ok(HttpVersion::Http3),
            _ => Err(StackError::UnknownValue {
                field: "http version",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_cfn())
    }
}

/// 価格クラス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceClass {
    #[serde(rename = "PriceClass_100")]
    Class100,
    #[serde(rename = "PriceClass_200")]
    Class200,
    #[serde(rename = "PriceClass_All")]
    All,
}

impl PriceClass {
    pub fn as_cfn(&self) -> &'static str {
        match self {
            PriceClass::Class100 => "PriceClass_100",
            PriceClass::Class200 => "PriceClass_200",
            PriceClass::All => "PriceClass_All",
        }
    }
}

impl FromStr for PriceClass {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().trim_start_matches("priceclass_") {
            "100" => Ok(PriceClass::Class100),
            "200" => Ok(PriceClass::Class200),
            "all" => Ok(PriceClass::All),
            _ => Err(StackError::UnknownValue {
                field: "price class",
                value: s.to_string(),
            }),
        }
    }
}

/// S3 オリジンの CloudFront ディストリビューション
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionSpec {
    pub id: String,
    pub comment: Option<String>,
    /// オリジンとなるバケットの id
    pub origin_bucket: String,
    pub default_root_object: Option<String>,
    pub http_version: HttpVersion,
    /// 使用する OAC の id（未指定なら従来の OAI のまま）
    pub origin_access_control: Option<String>,
    pub price_class: Option<PriceClass>,
    pub enable_ipv6: bool,
}

impl DistributionSpec {
    pub fn new(id: impl Into<String>, origin_bucket: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            comment: None,
            origin_bucket: origin_bucket.into(),
            default_root_object: None,
            http_version: HttpVersion::default(),
            origin_access_control: None,
            price_class: None,
            enable_ipv6: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_version_aliases() {
        assert_eq!("http2and3".parse::<HttpVersion>().unwrap(), HttpVersion::Http2And3);
        assert_eq!("HTTP2_AND_3".parse::<HttpVersion>().unwrap(), HttpVersion::Http2And3);
        assert_eq!("http1.1".parse::<HttpVersion>().unwrap(), HttpVersion::Http1_1);
        assert!("spdy".parse::<HttpVersion>().is_err());
    }

    #[test]
    fn test_signing_values() {
        assert_eq!(
            "no_override".parse::<SigningBehavior>().unwrap().as_cfn(),
            "no-override"
        );
        assert_eq!("SigV4".parse::<SigningProtocol>().unwrap().as_cfn(), "sigv4");
    }

    #[test]
    fn test_price_class() {
        assert_eq!("PriceClass_100".parse::<PriceClass>().unwrap(), PriceClass::Class100);
        assert_eq!("all".parse::<PriceClass>().unwrap().as_cfn(), "PriceClass_All");
    }
}
