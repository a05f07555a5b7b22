//! Intrinsic expressions
//!
//! Parameter and tag values may embed a lookup instead of a literal:
//!
//! ```text
//! resolve:[<region>:]<param-path>[?]
//! import:<account-id>:<region>:<stack-name>:<output-key>[?]
//! upload:[<region>:]<path-style>:<object-key>
//! ```
//!
//! A trailing `?` marks the reference optional: when the value does not
//! exist it resolves to an empty string instead of failing.

use std::fmt;
use std::str::FromStr;

use crate::error::{EngineError, Result};

pub const RESOLVE_PREFIX: &str = "resolve:";
pub const IMPORT_PREFIX: &str = "import:";
pub const UPLOAD_PREFIX: &str = "upload:";

const IMPORT_SYNTAX: &str = "import:account_id:region:stack_name:output_key";
const RESOLVE_SYNTAX: &str = "resolve:[region:]parameter_path";

/// Parsed intrinsic lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntrinsicExpr {
    ParamStore {
        region: Option<String>,
        path: String,
        optional: bool,
    },
    StackOutput {
        account_id: String,
        region: String,
        stack_name: String,
        output_key: String,
        optional: bool,
    },
    Upload {
        region: Option<String>,
        style: UploadStyle,
        object_key: String,
    },
}

impl IntrinsicExpr {
    /// Parses a leaf value
    ///
    /// Returns `Ok(None)` for literals, i.e. values without a known prefix.
    pub fn parse(value: &str) -> Result<Option<Self>> {
        if value.starts_with(RESOLVE_PREFIX) {
            return Self::parse_resolve(value).map(Some);
        }
        if value.starts_with(IMPORT_PREFIX) {
            return Self::parse_import(value).map(Some);
        }
        if value.starts_with(UPLOAD_PREFIX) {
            return Self::parse_upload(value).map(Some);
        }
        Ok(None)
    }

    fn parse_resolve(value: &str) -> Result<Self> {
        let (lookup, optional) = strip_optional(value);
        let parts: Vec<&str> = lookup.split(':').collect();

        let path = parts[parts.len() - 1];
        if path.is_empty() {
            return Err(EngineError::InvalidIntrinsicSyntax {
                expression: value.to_string(),
                kind: "resolve",
                expected: RESOLVE_SYNTAX,
            });
        }
        let region = if parts.len() > 2 {
            Some(parts[parts.len() - 2].to_string())
        } else {
            None
        };

        Ok(Self::ParamStore {
            region,
            path: path.to_string(),
            optional,
        })
    }

    fn parse_import(value: &str) -> Result<Self> {
        let (lookup, optional) = strip_optional(value);
        let invalid = || EngineError::InvalidIntrinsicSyntax {
            expression: value.to_string(),
            kind: "import",
            expected: IMPORT_SYNTAX,
        };

        let parts: Vec<&str> = lookup.split(':').collect();
        let [_, account_id, region, stack_name, output_key] = parts.as_slice() else {
            return Err(invalid());
        };
        if [account_id, region, stack_name, output_key]
            .iter()
            .any(|part| part.is_empty())
        {
            return Err(invalid());
        }

        Ok(Self::StackOutput {
            account_id: account_id.to_string(),
            region: region.to_string(),
            stack_name: stack_name.to_string(),
            output_key: output_key.to_string(),
            optional,
        })
    }

    fn parse_upload(value: &str) -> Result<Self> {
        let unsupported = || EngineError::UnsupportedUploadStyle {
            expression: value.to_string(),
            supported: UploadStyle::SUPPORTED
                .iter()
                .map(|style| style.as_str().to_string())
                .collect(),
        };

        let parts: Vec<&str> = value.split(':').collect();
        if parts.len() < 3 {
            return Err(unsupported());
        }

        let object_key = parts[parts.len() - 1];
        let style = parts[parts.len() - 2]
            .parse::<UploadStyle>()
            .map_err(|_| unsupported())?;
        let region = if parts.len() > 3 {
            Some(parts[parts.len() - 3].to_string())
        } else {
            None
        };

        Ok(Self::Upload {
            region,
            style,
            object_key: object_key.to_string(),
        })
    }

    pub fn is_optional(&self) -> bool {
        match self {
            Self::ParamStore { optional, .. } | Self::StackOutput { optional, .. } => *optional,
            Self::Upload { .. } => false,
        }
    }
}

fn strip_optional(value: &str) -> (&str, bool) {
    match value.strip_suffix('?') {
        Some(stripped) => (stripped, true),
        None => (value, false),
    }
}

/// How an uploaded object's location is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadStyle {
    Path,
    S3KeyOnly,
    S3Uri,
    S3Url,
    VirtualHosted,
}

impl UploadStyle {
    pub const SUPPORTED: [UploadStyle; 5] = [
        Self::Path,
        Self::S3KeyOnly,
        Self::S3Uri,
        Self::S3Url,
        Self::VirtualHosted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::S3KeyOnly => "s3-key-only",
            Self::S3Uri => "s3-uri",
            Self::S3Url => "s3-url",
            Self::VirtualHosted => "virtual-hosted",
        }
    }

    /// Renders the location of `key` in `bucket`
    ///
    /// `path` and `virtual-hosted` use the `s3` host in us-east-1 and
    /// `s3-<region>` everywhere else.
    pub fn render(&self, bucket: &str, region: &str, key: &str) -> String {
        let host = if region == "us-east-1" {
            "s3".to_string()
        } else {
            format!("s3-{}", region)
        };

        match self {
            Self::S3Url => format!("s3://{}/{}", bucket, key),
            Self::S3Uri => format!("{}/{}", bucket, key),
            Self::S3KeyOnly => key.to_string(),
            Self::Path => format!("https://{}.amazonaws.com/{}/{}", host, bucket, key),
            Self::VirtualHosted => format!("https://{}.{}.amazonaws.com/{}", bucket, host, key),
        }
    }
}

impl FromStr for UploadStyle {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::SUPPORTED
            .iter()
            .copied()
            .find(|style| style.as_str() == s)
            .ok_or_else(|| format!("unknown upload style: {}", s))
    }
}

impl fmt::Display for UploadStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
