//! Synthesis: render a stack into a CloudFormation template.
//!
//! Each construct expands into one or more template resources:
//! - bucket       → `AWS::S3::Bucket`
//! - distribution → `AWS::CloudFront::Distribution`, its origin access
//!   identity, and the bucket policy that lets the identity read objects
//! - asset sync   → `Custom::AssetSync`
//! - function     → `AWS::IAM::Role` + `AWS::Lambda::Function`
//! - front door   → REST API, proxy resource, two `ANY` methods, deployment,
//!   stage, and an invoke permission

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use thiserror::Error;
use tracing::{debug, info};

use super::graph::{Stack, StackError};
use super::naming::logical_id;
use super::types::*;
use crate::assets::Asset;

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// Managed cache policy "CachingOptimized".
pub const CACHING_OPTIMIZED_POLICY_ID: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";

/// Parameter through which the deploy tool supplies the asset sync handler.
pub const ASSET_SYNC_HANDLER_PARAM: &str = "AssetSyncHandlerArn";

/// Parameter naming the bucket that holds staged file assets.
pub const ASSET_BUCKET_PARAM: &str = "AssetBucketName";

/// Repository name under which container assets are pushed.
pub const IMAGE_REPOSITORY: &str = "stackweave-assets";

#[derive(Debug, Error)]
pub enum SynthError {
    #[error(transparent)]
    Stack(#[from] StackError),

    #[error("no staged asset for construct '{0}'")]
    MissingAsset(String),

    #[error("JSON serialize error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML serialize error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

/// A CloudFormation template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,

    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "Parameters", default, skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, CfnParameter>,

    #[serde(rename = "Resources")]
    pub resources: IndexMap<String, CfnResource>,

    #[serde(rename = "Outputs", default, skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, CfnOutput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CfnParameter {
    #[serde(rename = "Type")]
    pub parameter_type: String,

    #[serde(rename = "Description")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CfnResource {
    #[serde(rename = "Type")]
    pub resource_type: String,

    #[serde(rename = "Properties")]
    pub properties: Json,

    #[serde(rename = "DependsOn", default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(rename = "Metadata", default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Json>,
}

impl CfnResource {
    fn new(resource_type: &str, properties: Json, path: &str) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            properties,
            depends_on: Vec::new(),
            metadata: Some(json!({ "stackweave:path": path })),
        }
    }

    fn depends_on(mut self, ids: &[&str]) -> Self {
        self.depends_on = ids.iter().map(|s| s.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CfnOutput {
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "Value")]
    pub value: Json,
}

/// Render `stack` into a template, using `assets` (keyed by consuming
/// logical id) for image tags and object keys.
pub fn synthesize(stack: &Stack, assets: &IndexMap<String, Asset>) -> Result<Template, SynthError> {
    let order = stack.execution_order()?;
    let mut template = Template {
        format_version: TEMPLATE_FORMAT_VERSION.to_string(),
        description: stack.description().map(str::to_string),
        parameters: IndexMap::new(),
        resources: IndexMap::new(),
        outputs: IndexMap::new(),
    };

    for id in &order {
        let Some(decl) = stack.get(id) else {
            continue;
        };
        debug!(construct = %decl.path, kind = %decl.kind(), "synthesizing");
        match &decl.spec {
            ResourceSpec::Bucket(b) => render_bucket(&mut template, decl, b),
            ResourceSpec::Distribution(d) => render_distribution(&mut template, decl, d),
            ResourceSpec::AssetSync(a) => {
                let asset = assets
                    .get(&decl.logical_id)
                    .ok_or_else(|| SynthError::MissingAsset(decl.path.clone()))?;
                render_asset_sync(&mut template, decl, a, asset);
            }
            ResourceSpec::Function(f) => {
                let asset = assets
                    .get(&decl.logical_id)
                    .ok_or_else(|| SynthError::MissingAsset(decl.path.clone()))?;
                render_function(&mut template, decl, f, asset);
            }
            ResourceSpec::FrontDoor(fd) => render_front_door(&mut template, decl, fd),
        }
    }

    info!(
        stack = stack.name(),
        constructs = stack.len(),
        resources = template.resources.len(),
        "synthesized template"
    );
    Ok(template)
}

fn render_bucket(t: &mut Template, decl: &Declaration, b: &BucketSpec) {
    t.resources.insert(
        decl.logical_id.clone(),
        CfnResource::new(
            "AWS::S3::Bucket",
            json!({ "BucketName": b.bucket_name }),
            &decl.path,
        ),
    );
}

fn render_distribution(t: &mut Template, decl: &Declaration, d: &DistributionSpec) {
    let origin_id = format!("{}Origin1", decl.logical_id);
    let identity_path = format!("{}/Origin1/S3Origin", decl.path);
    let identity_id = logical_id(&identity_path);

    // The bucket stays private; the distribution reads it through its own
    // origin access identity.
    t.resources.insert(
        identity_id.clone(),
        CfnResource::new(
            "AWS::CloudFront::CloudFrontOriginAccessIdentity",
            json!({
                "CloudFrontOriginAccessIdentityConfig": {
                    "Comment": format!("Identity for {}", origin_id),
                }
            }),
            &identity_path,
        ),
    );
    if let Some(bucket_id) = d.origin.referenced_ids().first() {
        let policy_path = format!("{}/Origin1/BucketPolicy", decl.path);
        let object_arns = Value::Join(vec![
            Value::GetAtt(bucket_id.to_string(), "Arn"),
            Value::literal("/*"),
        ]);
        let reader = Value::GetAtt(identity_id.clone(), "S3CanonicalUserId");
        t.resources.insert(
            logical_id(&policy_path),
            CfnResource::new(
                "AWS::S3::BucketPolicy",
                json!({
                    "Bucket": { "Ref": bucket_id },
                    "PolicyDocument": {
                        "Version": "2012-10-17",
                        "Statement": [{
                            "Action": "s3:GetObject",
                            "Effect": "Allow",
                            "Principal": {
                                "CanonicalUser": reader.to_cfn(),
                            },
                            "Resource": object_arns.to_cfn(),
                        }],
                    },
                }),
                &policy_path,
            ),
        );
    }

    let allowed: Vec<String> = d.allowed_methods.methods().iter().map(|m| m.to_string()).collect();
    let cached: Vec<String> = d.cached_methods.iter().map(|m| m.to_string()).collect();
    let props = json!({
        "DistributionConfig": {
            "Enabled": true,
            "HttpVersion": "http2",
            "Origins": [{
                "Id": origin_id,
                "DomainName": d.origin.to_cfn(),
                "S3OriginConfig": {
                    "OriginAccessIdentity": Value::Join(vec![
                        Value::literal("origin-access-identity/cloudfront/"),
                        Value::Ref(identity_id.clone()),
                    ])
                    .to_cfn(),
                },
            }],
            "DefaultCacheBehavior": {
                "TargetOriginId": origin_id,
                "AllowedMethods": allowed,
                "CachedMethods": cached,
                "Compress": d.compress,
                "ViewerProtocolPolicy": d.viewer_protocol.to_string(),
                "CachePolicyId": CACHING_OPTIMIZED_POLICY_ID,
            },
        }
    });
    t.resources.insert(
        decl.logical_id.clone(),
        CfnResource::new("AWS::CloudFront::Distribution", props, &decl.path),
    );
    t.outputs.insert(
        "DistributionDomainName".to_string(),
        CfnOutput {
            description: Some("Public domain of the static asset distribution".to_string()),
            value: Value::GetAtt(decl.logical_id.clone(), "DomainName").to_cfn(),
        },
    );
}

fn render_asset_sync(t: &mut Template, decl: &Declaration, a: &AssetSyncSpec, asset: &Asset) {
    ensure_parameter(
        t,
        ASSET_SYNC_HANDLER_PARAM,
        "ARN of the function that copies staged files into the destination bucket",
    );
    ensure_parameter(t, ASSET_BUCKET_PARAM, "Bucket holding staged file assets");
    let props = json!({
        "ServiceToken": { "Ref": ASSET_SYNC_HANDLER_PARAM },
        "SourceBucketName": { "Ref": ASSET_BUCKET_PARAM },
        "SourceObjectKey": asset.object_key(),
        "DestinationBucketName": a.destination.to_cfn(),
        "Prune": true,
    });
    t.resources.insert(
        decl.logical_id.clone(),
        CfnResource::new("Custom::AssetSync", props, &decl.path),
    );
}

fn render_function(t: &mut Template, decl: &Declaration, f: &FunctionSpec, asset: &Asset) {
    let role_path = format!("{}/ServiceRole", decl.path);
    let role_id = logical_id(&role_path);

    let mut role_props = json!({
        "AssumeRolePolicyDocument": {
            "Version": "2012-10-17",
            "Statement": [{
                "Action": "sts:AssumeRole",
                "Effect": "Allow",
                "Principal": { "Service": "lambda.amazonaws.com" },
            }],
        },
        "ManagedPolicyArns": [
            Value::Join(vec![
                Value::literal("arn:"),
                Value::Pseudo("AWS::Partition"),
                Value::literal(":iam::aws:policy/service-role/AWSLambdaBasicExecutionRole"),
            ])
            .to_cfn()
        ],
    });
    if !f.role_statements.is_empty() {
        let statements: Vec<Json> = f.role_statements.iter().map(PolicyStatement::to_cfn).collect();
        role_props["Policies"] = json!([{
            "PolicyName": format!("{}DefaultPolicy", decl.logical_id),
            "PolicyDocument": { "Version": "2012-10-17", "Statement": statements },
        }]);
    }
    t.resources.insert(
        role_id.clone(),
        CfnResource::new("AWS::IAM::Role", role_props, &role_path),
    );

    let variables: serde_json::Map<String, Json> = f
        .environment
        .iter()
        .map(|(k, v)| (k.clone(), v.to_cfn()))
        .collect();
    let image_uri = format!(
        "${{AWS::AccountId}}.dkr.ecr.${{AWS::Region}}.${{AWS::URLSuffix}}/{}:{}",
        IMAGE_REPOSITORY,
        asset.image_tag()
    );
    let mut props = json!({
        "Code": { "ImageUri": { "Fn::Sub": image_uri } },
        "PackageType": "Image",
        "FunctionName": f.function_name,
        "Role": Value::GetAtt(role_id.clone(), "Arn").to_cfn(),
        "Timeout": f.timeout_seconds,
        "Environment": { "Variables": variables },
    });
    if let Some(arch) = f.architecture {
        props["Architectures"] = json!([arch.to_string()]);
    }
    t.resources.insert(
        decl.logical_id.clone(),
        CfnResource::new("AWS::Lambda::Function", props, &decl.path).depends_on(&[&role_id]),
    );
}

fn render_front_door(t: &mut Template, decl: &Declaration, fd: &FrontDoorSpec) {
    let api_id = decl.logical_id.clone();
    let child = |name: &str| {
        let path = format!("{}/{}", decl.path, name);
        (logical_id(&path), path)
    };
    let (proxy_id, proxy_path) = child("Default/{proxy+}");
    let (root_method_id, root_method_path) = child("Default/ANY");
    let (proxy_method_id, proxy_method_path) = child("Default/{proxy+}/ANY");
    let (deployment_id, deployment_path) = child("Deployment");
    let (stage_id, stage_path) = child(&format!("DeploymentStage.{}", fd.stage_name));
    let (permission_id, permission_path) = child("Default/ANY/Permission");

    let integration_uri = Value::Join(vec![
        Value::literal("arn:"),
        Value::Pseudo("AWS::Partition"),
        Value::literal(":apigateway:"),
        Value::Pseudo("AWS::Region"),
        Value::literal(":lambda:path/2015-03-31/functions/"),
        fd.backend.clone(),
        Value::literal("/invocations"),
    ])
    .to_cfn();
    let integration = json!({
        "Type": "AWS_PROXY",
        "IntegrationHttpMethod": "POST",
        "Uri": integration_uri,
    });

    t.resources.insert(
        api_id.clone(),
        CfnResource::new(
            "AWS::ApiGateway::RestApi",
            json!({ "Name": fd.api_name }),
            &decl.path,
        ),
    );
    t.resources.insert(
        proxy_id.clone(),
        CfnResource::new(
            "AWS::ApiGateway::Resource",
            json!({
                "ParentId": { "Fn::GetAtt": [api_id, "RootResourceId"] },
                "PathPart": "{proxy+}",
                "RestApiId": { "Ref": api_id },
            }),
            &proxy_path,
        ),
    );
    t.resources.insert(
        root_method_id.clone(),
        CfnResource::new(
            "AWS::ApiGateway::Method",
            json!({
                "HttpMethod": "ANY",
                "ResourceId": { "Fn::GetAtt": [api_id, "RootResourceId"] },
                "RestApiId": { "Ref": api_id },
                "AuthorizationType": "NONE",
                "Integration": integration.clone(),
            }),
            &root_method_path,
        ),
    );
    t.resources.insert(
        proxy_method_id.clone(),
        CfnResource::new(
            "AWS::ApiGateway::Method",
            json!({
                "HttpMethod": "ANY",
                "ResourceId": { "Ref": proxy_id },
                "RestApiId": { "Ref": api_id },
                "AuthorizationType": "NONE",
                "Integration": integration,
            }),
            &proxy_method_path,
        ),
    );
    t.resources.insert(
        deployment_id.clone(),
        CfnResource::new(
            "AWS::ApiGateway::Deployment",
            json!({ "RestApiId": { "Ref": api_id } }),
            &deployment_path,
        )
        .depends_on(&[&root_method_id, &proxy_method_id]),
    );
    t.resources.insert(
        stage_id.clone(),
        CfnResource::new(
            "AWS::ApiGateway::Stage",
            json!({
                "RestApiId": { "Ref": api_id },
                "DeploymentId": { "Ref": deployment_id },
                "StageName": fd.stage_name,
            }),
            &stage_path,
        ),
    );
    t.resources.insert(
        permission_id,
        CfnResource::new(
            "AWS::Lambda::Permission",
            json!({
                "Action": "lambda:InvokeFunction",
                "FunctionName": fd.backend.to_cfn(),
                "Principal": "apigateway.amazonaws.com",
                "SourceArn": Value::Join(vec![
                    Value::literal("arn:"),
                    Value::Pseudo("AWS::Partition"),
                    Value::literal(":execute-api:"),
                    Value::Pseudo("AWS::Region"),
                    Value::literal(":"),
                    Value::Pseudo("AWS::AccountId"),
                    Value::literal(":"),
                    Value::Ref(api_id.clone()),
                    Value::literal("/*/*"),
                ])
                .to_cfn(),
            }),
            &permission_path,
        ),
    );

    t.outputs.insert(
        "ApiEndpoint".to_string(),
        CfnOutput {
            description: Some("HTTPS endpoint of the API front door".to_string()),
            value: Value::Join(vec![
                Value::literal("https://"),
                Value::Ref(api_id),
                Value::literal(".execute-api."),
                Value::Pseudo("AWS::Region"),
                Value::literal("."),
                Value::Pseudo("AWS::URLSuffix"),
                Value::literal("/"),
                Value::Ref(stage_id),
                Value::literal("/"),
            ])
            .to_cfn(),
        },
    );
}

fn ensure_parameter(t: &mut Template, name: &str, description: &str) {
    t.parameters
        .entry(name.to_string())
        .or_insert_with(|| CfnParameter {
            parameter_type: "String".to_string(),
            description: description.to_string(),
        });
}

/// Output format for templates on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    #[default]
    Json,
    Yaml,
}

impl Format {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }
}

/// Serialize a template in the given format.
pub fn render(template: &Template, format: Format) -> Result<String, SynthError> {
    let text = match format {
        Format::Json => {
            let mut s = serde_json::to_string_pretty(template)?;
            s.push('\n');
            s
        }
        Format::Yaml => serde_yaml_ng::to_string(template)?,
    };
    Ok(text)
}
