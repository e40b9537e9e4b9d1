//! Stack builder: declares the five constructs of the web stack.
//!
//! Each `declare_*` call adds one new declaration and returns a typed handle.
//! Handles are the only way to wire constructs together, so the dependency
//! order (bucket → distribution → function → front door) is enforced by the
//! signatures.

use indexmap::IndexMap;
use std::path::PathBuf;
use tracing::{debug, info};

use super::config::{FunctionOverrides, StackConfig};
use super::graph::{Stack, StackError};
use super::naming::{logical_id, NamingPolicy};
use super::types::*;

/// Function timeout in seconds.
pub const FUNCTION_TIMEOUT_SECONDS: u32 = 30;

/// Name of the single API stage.
pub const API_STAGE: &str = "prod";

/// Environment flag telling the application it runs under serverless compute.
pub const ENV_RUNS_ON_LAMBDA: &str = "IS_RUN_ON_LAMBDA";

/// Environment variable carrying the public URL of static assets.
pub const ENV_STATIC_URL: &str = "STATIC_URL";

/// Identity-provider administrative actions granted by
/// [`StackBuilder::grant_identity_admin`].
pub const IDENTITY_ADMIN_ACTIONS: [&str; 3] = [
    "cognito-idp:AdminInitiateAuth",
    "cognito-idp:GetUser",
    "cognito-idp:AdminRespondToAuthChallenge",
];

/// Handles to everything [`StackBuilder::build_default`] declares.
#[derive(Debug, Clone)]
pub struct StackHandles {
    pub bucket: BucketRef,
    pub distribution: DistributionRef,
    pub asset_sync: AssetSyncRef,
    pub function: FunctionRef,
    pub front_door: FrontDoorRef,
}

/// Declares constructs into a single [`Stack`].
pub struct StackBuilder<N: NamingPolicy> {
    id: ConstructId,
    naming: N,
    stack: Stack,
}

impl<N: NamingPolicy> StackBuilder<N> {
    pub fn new(id: ConstructId, naming: N) -> Self {
        let stack = Stack::new(id.clone())
            .with_description(format!("Serverless web stack {}", id.as_str()));
        Self { id, naming, stack }
    }

    pub fn id(&self) -> &ConstructId {
        &self.id
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// Declare all five constructs in dependency order.
    ///
    /// The identity grant is not part of this path; call
    /// [`grant_identity_admin`](Self::grant_identity_admin) separately.
    pub fn build_default(&mut self, config: &StackConfig) -> Result<StackHandles, StackError> {
        info!(stack = %self.id, "declaring stack");
        let bucket = self.declare_storage()?;
        let distribution = self.declare_distribution(&bucket)?;
        let asset_sync = self.declare_asset_sync(config.static_dir.clone(), &bucket)?;
        let function = self.declare_compute_function(
            config.function_context.clone(),
            &distribution,
            &config.overrides(),
        )?;
        let front_door = self.declare_front_door(&function)?;
        info!(stack = %self.id, constructs = self.stack.len(), "stack declared");

        Ok(StackHandles {
            bucket,
            distribution,
            asset_sync,
            function,
            front_door,
        })
    }

    /// Declare the static storage bucket.
    pub fn declare_storage(&mut self) -> Result<BucketRef, StackError> {
        let bucket_name = self.naming.physical_name(&self.id, ResourceKind::Bucket);
        let logical = self.add(
            ResourceKind::Bucket,
            ResourceSpec::Bucket(BucketSpec { bucket_name }),
        )?;
        Ok(BucketRef::new(logical))
    }

    /// Declare a CDN distribution with `bucket` as its only origin.
    ///
    /// Viewers are redirected to HTTPS, only `GET`, `HEAD` and `OPTIONS`
    /// reach the origin, and responses are compressed.
    pub fn declare_distribution(
        &mut self,
        bucket: &BucketRef,
    ) -> Result<DistributionRef, StackError> {
        self.stack
            .expect_kind(bucket.logical_id(), ResourceKind::Bucket)?;
        let spec = DistributionSpec {
            origin: Value::GetAtt(bucket.logical_id().to_string(), "RegionalDomainName"),
            allowed_methods: AllowedMethods::GetHeadOptions,
            cached_methods: vec![HttpMethod::Get, HttpMethod::Head],
            compress: true,
            viewer_protocol: ViewerProtocolPolicy::RedirectToHttps,
        };
        let logical = self.add(ResourceKind::Distribution, ResourceSpec::Distribution(spec))?;
        Ok(DistributionRef::new(logical))
    }

    /// Declare a one-way sync of `source` into `bucket`.
    ///
    /// The directory is not inspected here; it is hashed at synth time.
    pub fn declare_asset_sync(
        &mut self,
        source: impl Into<PathBuf>,
        bucket: &BucketRef,
    ) -> Result<AssetSyncRef, StackError> {
        self.stack
            .expect_kind(bucket.logical_id(), ResourceKind::Bucket)?;
        let spec = AssetSyncSpec {
            source: source.into(),
            destination: Value::Ref(bucket.logical_id().to_string()),
        };
        let logical = self.add(ResourceKind::AssetSync, ResourceSpec::AssetSync(spec))?;
        Ok(AssetSyncRef::new(logical))
    }

    /// Declare the container-image function serving requests.
    ///
    /// Its environment carries `IS_RUN_ON_LAMBDA=true` and `STATIC_URL`, the
    /// HTTPS URL of `distribution`, resolved at deploy time.
    pub fn declare_compute_function(
        &mut self,
        build_context: impl Into<PathBuf>,
        distribution: &DistributionRef,
        overrides: &FunctionOverrides,
    ) -> Result<FunctionRef, StackError> {
        self.stack
            .expect_kind(distribution.logical_id(), ResourceKind::Distribution)?;

        let mut environment = IndexMap::new();
        environment.insert(ENV_RUNS_ON_LAMBDA.to_string(), Value::literal("true"));
        environment.insert(
            ENV_STATIC_URL.to_string(),
            Value::Join(vec![
                Value::literal("https://"),
                Value::GetAtt(distribution.logical_id().to_string(), "DomainName"),
                Value::literal("/"),
            ]),
        );

        let base = FunctionSpec {
            function_name: self.naming.physical_name(&self.id, ResourceKind::Function),
            build_context: build_context.into(),
            timeout_seconds: FUNCTION_TIMEOUT_SECONDS,
            architecture: None,
            environment,
            role_statements: Vec::new(),
        };
        let spec = overrides.merge(base);
        debug!(architecture = ?spec.architecture, "function architecture");

        let logical = self.add(ResourceKind::Function, ResourceSpec::Function(spec))?;
        Ok(FunctionRef::new(logical))
    }

    /// Declare a catch-all REST API whose only backend is `function`.
    pub fn declare_front_door(&mut self, function: &FunctionRef) -> Result<FrontDoorRef, StackError> {
        self.stack
            .expect_kind(function.logical_id(), ResourceKind::Function)?;
        let spec = FrontDoorSpec {
            api_name: self.id.child(ResourceKind::FrontDoor),
            backend: Value::GetAtt(function.logical_id().to_string(), "Arn"),
            stage_name: API_STAGE.to_string(),
        };
        let logical = self.add(ResourceKind::FrontDoor, ResourceSpec::FrontDoor(spec))?;
        Ok(FrontDoorRef::new(logical))
    }

    /// Allow `function` to call the three identity-provider admin actions in
    /// [`IDENTITY_ADMIN_ACTIONS`] on any resource.
    ///
    /// Never called by [`build_default`](Self::build_default).
    pub fn grant_identity_admin(&mut self, function: &FunctionRef) -> Result<(), StackError> {
        let id = function.logical_id().to_string();
        let decl = self
            .stack
            .get_mut(&id)
            .ok_or_else(|| StackError::UnknownConstruct(id.clone()))?;
        let ResourceSpec::Function(ref mut spec) = decl.spec else {
            return Err(StackError::KindMismatch {
                id,
                expected: ResourceKind::Function,
                actual: decl.kind(),
            });
        };
        spec.role_statements.push(identity_admin_statement());
        info!(function = %decl.path, "granted identity-provider admin actions");
        Ok(())
    }

    /// Hand over the finished stack.
    pub fn finish(self) -> Stack {
        self.stack
    }

    fn add(&mut self, kind: ResourceKind, spec: ResourceSpec) -> Result<String, StackError> {
        let path = self.id.child(kind);
        let logical = logical_id(&path);
        debug!(%path, %logical, %kind, "declare");
        self.stack.insert(Declaration {
            path,
            logical_id: logical.clone(),
            spec,
        })?;
        Ok(logical)
    }
}

/// The statement added by [`StackBuilder::grant_identity_admin`].
pub fn identity_admin_statement() -> PolicyStatement {
    PolicyStatement {
        sid: Some("VisualEditor0".to_string()),
        effect: Effect::Allow,
        actions: IDENTITY_ADMIN_ACTIONS.iter().map(|a| a.to_string()).collect(),
        resources: vec!["*".to_string()],
    }
}
