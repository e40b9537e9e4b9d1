//! Construct types: identifiers, deploy-time values, and the five declarations
//! a web stack is made of.
//!
//! Declarations are plain data. Cross-construct wiring happens only through
//! [`Value`] tokens, which carry the logical id of the construct they point at;
//! the graph derives its edges from those tokens.

use indexmap::IndexMap;
use std::fmt;
use std::path::PathBuf;

use super::StackError;

// ============================================================================
// Identifiers
// ============================================================================

/// Seed used to derive every child construct id in a stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstructId(String);

impl ConstructId {
    /// Validate and wrap a construct identifier.
    ///
    /// Empty identifiers and identifiers containing the path separator `/`
    /// are rejected.
    pub fn new(id: impl Into<String>) -> Result<Self, StackError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(StackError::EmptyConstructId);
        }
        if id.contains('/') {
            return Err(StackError::InvalidConstructId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Construct path of a child resource, e.g. `Demo-Bucket`.
    pub fn child(&self, kind: ResourceKind) -> String {
        format!("{}-{}", self.0, kind.construct_suffix())
    }
}

impl fmt::Display for ConstructId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Resource kinds
// ============================================================================

/// The five construct kinds a stack declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Bucket,
    Distribution,
    AssetSync,
    Function,
    FrontDoor,
}

impl ResourceKind {
    /// Suffix appended to the stack identifier to form the construct path.
    pub fn construct_suffix(self) -> &'static str {
        match self {
            Self::Bucket => "Bucket",
            Self::Distribution => "CloudFront",
            Self::AssetSync => "Deployment",
            Self::Function => "Lambda",
            Self::FrontDoor => "API-Gateway",
        }
    }

    /// Short lowercase label used inside physical names.
    pub fn name_label(self) -> &'static str {
        match self {
            Self::Bucket => "bucket",
            Self::Distribution => "cdn",
            Self::AssetSync => "deployment",
            Self::Function => "lambda",
            Self::FrontDoor => "api",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bucket => write!(f, "bucket"),
            Self::Distribution => write!(f, "distribution"),
            Self::AssetSync => write!(f, "asset-sync"),
            Self::Function => write!(f, "function"),
            Self::FrontDoor => write!(f, "front-door"),
        }
    }
}

// ============================================================================
// Deploy-time values
// ============================================================================

/// A property value: either a literal known at declaration time or a token
/// resolved by the provisioning engine at deploy time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Literal(String),
    /// `Ref` to another construct in the same stack (by logical id).
    Ref(String),
    /// `Ref` to a provider pseudo parameter such as `AWS::Region`.
    Pseudo(&'static str),
    /// `Fn::GetAtt` of another construct's attribute.
    GetAtt(String, &'static str),
    /// `Fn::Join` with an empty delimiter.
    Join(Vec<Value>),
}

impl Value {
    pub fn literal(s: impl Into<String>) -> Self {
        Self::Literal(s.into())
    }

    /// Logical ids of the constructs this value depends on.
    pub fn referenced_ids(&self) -> Vec<&str> {
        match self {
            Self::Literal(_) | Self::Pseudo(_) => vec![],
            Self::Ref(id) | Self::GetAtt(id, _) => vec![id.as_str()],
            Self::Join(parts) => parts.iter().flat_map(Value::referenced_ids).collect(),
        }
    }

    /// Whether this value is a deploy-time token rather than a plain literal.
    pub fn is_token(&self) -> bool {
        !matches!(self, Self::Literal(_))
    }

    /// Render as a CloudFormation intrinsic.
    pub fn to_cfn(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            Self::Literal(s) => json!(s),
            Self::Ref(id) => json!({ "Ref": id }),
            Self::Pseudo(p) => json!({ "Ref": p }),
            Self::GetAtt(id, attr) => json!({ "Fn::GetAtt": [id, attr] }),
            Self::Join(parts) => {
                let rendered: Vec<_> = parts.iter().map(Value::to_cfn).collect();
                json!({ "Fn::Join": ["", rendered] })
            }
        }
    }
}

// ============================================================================
// Distribution settings
// ============================================================================

/// HTTP verbs relevant to edge behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
    Options,
    Put,
    Post,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Safe (read-only, idempotent) verbs.
    pub fn is_safe(self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Options)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// Method sets a distribution behavior can forward to its origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowedMethods {
    GetHead,
    GetHeadOptions,
    All,
}

impl AllowedMethods {
    pub fn methods(self) -> &'static [HttpMethod] {
        use HttpMethod::*;
        match self {
            Self::GetHead => &[Get, Head],
            Self::GetHeadOptions => &[Get, Head, Options],
            Self::All => &[Get, Head, Options, Put, Patch, Post, Delete],
        }
    }
}

/// How the distribution treats plain-HTTP viewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerProtocolPolicy {
    AllowAll,
    RedirectToHttps,
    HttpsOnly,
}

impl fmt::Display for ViewerProtocolPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllowAll => write!(f, "allow-all"),
            Self::RedirectToHttps => write!(f, "redirect-to-https"),
            Self::HttpsOnly => write!(f, "https-only"),
        }
    }
}

// ============================================================================
// Function settings
// ============================================================================

/// Instruction set of the function runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    Arm64,
    X86_64,
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arm64 => write!(f, "arm64"),
            Self::X86_64 => write!(f, "x86_64"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "Allow"),
            Self::Deny => write!(f, "Deny"),
        }
    }
}

/// One statement attached to the function's execution role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyStatement {
    pub sid: Option<String>,
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

impl PolicyStatement {
    pub fn to_cfn(&self) -> serde_json::Value {
        let mut stmt = serde_json::Map::new();
        if let Some(ref sid) = self.sid {
            stmt.insert("Sid".into(), serde_json::json!(sid));
        }
        stmt.insert("Effect".into(), serde_json::json!(self.effect.to_string()));
        stmt.insert("Action".into(), serde_json::json!(self.actions));
        stmt.insert("Resource".into(), serde_json::json!(self.resources));
        serde_json::Value::Object(stmt)
    }
}

// ============================================================================
// Declarations
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct BucketSpec {
    pub bucket_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistributionSpec {
    /// Domain of the single origin (a token on the bucket).
    pub origin: Value,
    pub allowed_methods: AllowedMethods,
    pub cached_methods: Vec<HttpMethod>,
    pub compress: bool,
    pub viewer_protocol: ViewerProtocolPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetSyncSpec {
    /// Local directory pushed into the bucket.
    pub source: PathBuf,
    pub destination: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSpec {
    pub function_name: String,
    /// Local build context packaged as the container image.
    pub build_context: PathBuf,
    pub timeout_seconds: u32,
    /// `None` leaves the runtime default in place; the field is not emitted.
    pub architecture: Option<Architecture>,
    pub environment: IndexMap<String, Value>,
    pub role_statements: Vec<PolicyStatement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrontDoorSpec {
    pub api_name: String,
    /// The one backend every route and verb is forwarded to.
    pub backend: Value,
    pub stage_name: String,
}

/// Kind-specific properties of a declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceSpec {
    Bucket(BucketSpec),
    Distribution(DistributionSpec),
    AssetSync(AssetSyncSpec),
    Function(FunctionSpec),
    FrontDoor(FrontDoorSpec),
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Bucket(_) => ResourceKind::Bucket,
            Self::Distribution(_) => ResourceKind::Distribution,
            Self::AssetSync(_) => ResourceKind::AssetSync,
            Self::Function(_) => ResourceKind::Function,
            Self::FrontDoor(_) => ResourceKind::FrontDoor,
        }
    }

    /// Every token-bearing value in this declaration.
    pub fn values(&self) -> Vec<&Value> {
        match self {
            Self::Bucket(_) => vec![],
            Self::Distribution(d) => vec![&d.origin],
            Self::AssetSync(a) => vec![&a.destination],
            Self::Function(f) => f.environment.values().collect(),
            Self::FrontDoor(fd) => vec![&fd.backend],
        }
    }
}

/// A single declared construct.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    /// Human-readable construct path, e.g. `Demo-Lambda`.
    pub path: String,
    /// Template key derived from the path.
    pub logical_id: String,
    pub spec: ResourceSpec,
}

impl Declaration {
    pub fn kind(&self) -> ResourceKind {
        self.spec.kind()
    }

    /// Logical ids this declaration depends on, deduplicated, in first-seen order.
    pub fn dependencies(&self) -> Vec<String> {
        let mut deps: Vec<String> = Vec::new();
        for value in self.spec.values() {
            for id in value.referenced_ids() {
                if !deps.iter().any(|d| d == id) {
                    deps.push(id.to_string());
                }
            }
        }
        deps
    }
}

// ============================================================================
// Handles
// ============================================================================

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            logical_id: String,
        }

        impl $name {
            pub(crate) fn new(logical_id: String) -> Self {
                Self { logical_id }
            }

            pub fn logical_id(&self) -> &str {
                &self.logical_id
            }
        }
    };
}

handle!(
    /// Handle to a declared bucket.
    BucketRef
);
handle!(
    /// Handle to a declared distribution.
    DistributionRef
);
handle!(
    /// Handle to a declared asset sync job.
    AssetSyncRef
);
handle!(
    /// Handle to a declared compute function.
    FunctionRef
);
handle!(
    /// Handle to a declared front door.
    FrontDoorRef
);

// ============================================================================
// Tests
// ============================================================================
