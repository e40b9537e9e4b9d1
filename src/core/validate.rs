//! Structural validation of a declared stack.
//!
//! Checks that hold for any stack, whatever built it:
//! - every token points at a declared construct, and the graph is acyclic
//! - bucket and function names follow the provider's naming rules
//! - distributions in front of a bucket only forward safe verbs
//! - function timeouts stay within the provider's limit
//! - a front door's backend is a function

use regex::Regex;
use std::sync::LazyLock;

use super::graph::Stack;
use super::types::*;

/// Longest function timeout the provider accepts, in seconds.
pub const MAX_FUNCTION_TIMEOUT: u32 = 900;

static BUCKET_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$").expect("valid regex"));

static IPV4_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,3}(\.\d{1,3}){3}$").expect("valid regex"));

static FUNCTION_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid regex"));

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

fn error(message: String) -> ValidationError {
    ValidationError { message }
}

/// Validate a stack. Returns every problem found (empty = valid).
pub fn validate_stack(stack: &Stack) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if stack.is_empty() {
        errors.push(error(format!("stack '{}' declares no constructs", stack.name())));
    }

    for r in stack.references() {
        if stack.get(&r.to).is_none() {
            errors.push(error(format!(
                "construct '{}' references unknown construct '{}'",
                r.from, r.to
            )));
        }
    }
    if let Some(members) = stack.cycle() {
        errors.push(error(format!("dependency cycle detected involving: {}", members)));
    }

    for decl in stack.declarations() {
        match &decl.spec {
            ResourceSpec::Bucket(b) => {
                if let Some(problem) = bucket_name_problem(&b.bucket_name) {
                    errors.push(error(format!(
                        "bucket '{}' has invalid name '{}': {}",
                        decl.path, b.bucket_name, problem
                    )));
                }
            }
            ResourceSpec::Distribution(d) => {
                let bucket_origin = d
                    .origin
                    .referenced_ids()
                    .iter()
                    .any(|id| matches!(stack.get(id), Some(o) if o.kind() == ResourceKind::Bucket));
                if !bucket_origin {
                    errors.push(error(format!(
                        "distribution '{}' origin is not a declared bucket",
                        decl.path
                    )));
                }
                let unsafe_methods: Vec<String> = d
                    .allowed_methods
                    .methods()
                    .iter()
                    .filter(|m| !m.is_safe())
                    .map(|m| m.to_string())
                    .collect();
                if !unsafe_methods.is_empty() {
                    errors.push(error(format!(
                        "distribution '{}' allows write methods on a read-only origin: {}",
                        decl.path,
                        unsafe_methods.join(", ")
                    )));
                }
            }
            ResourceSpec::AssetSync(a) => {
                if a.source.as_os_str().is_empty() {
                    errors.push(error(format!("asset sync '{}' has no source", decl.path)));
                }
            }
            ResourceSpec::Function(f) => {
                if !FUNCTION_NAME.is_match(&f.function_name) {
                    errors.push(error(format!(
                        "function '{}' has invalid name '{}'",
                        decl.path, f.function_name
                    )));
                }
                if f.timeout_seconds == 0 || f.timeout_seconds > MAX_FUNCTION_TIMEOUT {
                    errors.push(error(format!(
                        "function '{}' timeout {}s outside 1..={}",
                        decl.path, f.timeout_seconds, MAX_FUNCTION_TIMEOUT
                    )));
                }
            }
            ResourceSpec::FrontDoor(fd) => {
                let backends = fd.backend.referenced_ids();
                let is_function = backends.len() == 1
                    && matches!(stack.get(backends[0]), Some(b) if b.kind() == ResourceKind::Function);
                if !is_function {
                    errors.push(error(format!(
                        "front door '{}' backend is not a single declared function",
                        decl.path
                    )));
                }
            }
        }
    }

    errors
}

/// Why `name` is not a valid bucket name, if it isn't.
pub fn bucket_name_problem(name: &str) -> Option<&'static str> {
    if name.len() < 3 || name.len() > 63 {
        return Some("length must be 3 to 63 characters");
    }
    if !BUCKET_NAME.is_match(name) {
        return Some("only lowercase letters, digits, '.' and '-', starting and ending alphanumeric");
    }
    if name.contains("..") {
        return Some("must not contain adjacent periods");
    }
    if IPV4_LIKE.is_match(name) {
        return Some("must not be formatted as an IP address");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::builder::StackBuilder;
    use crate::core::config::StackConfig;
    use crate::core::naming::{logical_id, DatedNaming};
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn built() -> Stack {
        let naming = DatedNaming::new(NaiveDate::from_ymd_opt(2026, 10, 18).unwrap());
        let mut b = StackBuilder::new(ConstructId::new("Demo").unwrap(), naming);
        b.build_default(&StackConfig {
            construct_id: "Demo".into(),
            architecture: None,
            function_context: PathBuf::from("src"),
            static_dir: PathBuf::from("static"),
        })
        .unwrap();
        b.finish()
    }

    fn messages(errors: &[ValidationError]) -> Vec<&str> {
        errors.iter().map(|e| e.message.as_str()).collect()
    }

    #[test]
    fn test_default_stack_is_valid() {
        let errors = validate_stack(&built());
        assert!(errors.is_empty(), "unexpected errors: {:?}", messages(&errors));
    }

    #[test]
    fn test_empty_stack() {
        let stack = Stack::new(ConstructId::new("Empty").unwrap());
        let errors = validate_stack(&stack);
        assert!(errors.iter().any(|e| e.message.contains("no constructs")));
    }

    #[test]
    fn test_bad_bucket_name() {
        let policy = |_: &ConstructId, _: ResourceKind| "Not_Valid".to_string();
        let mut b = StackBuilder::new(ConstructId::new("Demo").unwrap(), policy);
        b.declare_storage().unwrap();
        let errors = validate_stack(&b.finish());
        assert!(errors.iter().any(|e| e.message.contains("invalid name")));
    }

    #[test]
    fn test_bucket_name_rules() {
        assert_eq!(bucket_name_problem("demo-bucket-20261018"), None);
        assert!(bucket_name_problem("ab").is_some());
        assert!(bucket_name_problem(&"a".repeat(64)).is_some());
        assert!(bucket_name_problem("-leading").is_some());
        assert!(bucket_name_problem("Upper").is_some());
        assert!(bucket_name_problem("a..b").is_some());
        assert!(bucket_name_problem("192.168.1.1").is_some());
    }

    #[test]
    fn test_write_methods_rejected() {
        let mut stack = built();
        let dist_id = stack
            .of_kind(ResourceKind::Distribution)
            .next()
            .unwrap()
            .logical_id
            .clone();
        if let ResourceSpec::Distribution(ref mut d) = stack.get_mut(&dist_id).unwrap().spec {
            d.allowed_methods = AllowedMethods::All;
        }
        let errors = validate_stack(&stack);
        assert!(errors.iter().any(|e| e.message.contains("write methods")));
        assert!(errors.iter().any(|e| e.message.contains("POST")));
    }

    #[test]
    fn test_timeout_out_of_range() {
        let mut stack = built();
        let fn_id = stack
            .of_kind(ResourceKind::Function)
            .next()
            .unwrap()
            .logical_id
            .clone();
        if let ResourceSpec::Function(ref mut f) = stack.get_mut(&fn_id).unwrap().spec {
            f.timeout_seconds = 901;
        }
        let errors = validate_stack(&stack);
        assert!(errors.iter().any(|e| e.message.contains("timeout")));
    }

    #[test]
    fn test_front_door_backend_must_be_function() {
        let mut stack = Stack::new(ConstructId::new("Demo").unwrap());
        stack
            .insert(Declaration {
                path: "Demo-Bucket".into(),
                logical_id: logical_id("Demo-Bucket"),
                spec: ResourceSpec::Bucket(BucketSpec {
                    bucket_name: "demo-bucket".into(),
                }),
            })
            .unwrap();
        stack
            .insert(Declaration {
                path: "Demo-API-Gateway".into(),
                logical_id: logical_id("Demo-API-Gateway"),
                spec: ResourceSpec::FrontDoor(FrontDoorSpec {
                    api_name: "Demo-API-Gateway".into(),
                    backend: Value::GetAtt(logical_id("Demo-Bucket"), "Arn"),
                    stage_name: "prod".into(),
                }),
            })
            .unwrap();
        let errors = validate_stack(&stack);
        assert!(errors.iter().any(|e| e.message.contains("not a single declared function")));
    }

    #[test]
    fn test_dangling_reference_reported() {
        let mut stack = Stack::new(ConstructId::new("Demo").unwrap());
        stack
            .insert(Declaration {
                path: "Demo-Deployment".into(),
                logical_id: "DemoDeployment".into(),
                spec: ResourceSpec::AssetSync(AssetSyncSpec {
                    source: PathBuf::from("static"),
                    destination: Value::Ref("Ghost".into()),
                }),
            })
            .unwrap();
        let errors = validate_stack(&stack);
        assert!(errors.iter().any(|e| e.message.contains("unknown construct 'Ghost'")));
    }

    #[test]
    fn test_cycle_and_dangling_reference_both_reported() {
        let front_door = |id: &str, backend: &str| Declaration {
            path: format!("{id}-path"),
            logical_id: id.to_string(),
            spec: ResourceSpec::FrontDoor(FrontDoorSpec {
                api_name: id.to_string(),
                backend: Value::GetAtt(backend.to_string(), "Arn"),
                stage_name: "prod".into(),
            }),
        };
        let mut stack = Stack::new(ConstructId::new("Demo").unwrap());
        stack.insert(front_door("A", "B")).unwrap();
        stack.insert(front_door("B", "A")).unwrap();
        stack.insert(front_door("C", "Ghost")).unwrap();
        let errors = validate_stack(&stack);
        assert!(errors.iter().any(|e| e.message.contains("unknown construct 'Ghost'")));
        assert!(errors
            .iter()
            .any(|e| e.message.contains("dependency cycle detected involving: A, B")));
    }
}
