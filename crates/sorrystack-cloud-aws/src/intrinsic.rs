//! CloudFormation intrinsic functions and pseudo parameters

use serde_json::{Value, json};
use std::collections::BTreeSet;

pub const ACCOUNT_ID: &str = "AWS::AccountId";
pub const REGION: &str = "AWS::Region";
pub const PARTITION: &str = "AWS::Partition";
pub const URL_SUFFIX: &str = "AWS::URLSuffix";
pub const STACK_NAME: &str = "AWS::StackName";

/// `{ "Ref": id }`
pub fn reference(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

/// `{ "Fn::GetAtt": [id, attribute] }`
pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

/// `{ "Fn::Join": [delimiter, parts] }`
pub fn join(delimiter: &str, parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": [delimiter, parts] })
}

/// `{ "Fn::Select": [index, list] }`
pub fn select(index: usize, list: Value) -> Value {
    json!({ "Fn::Select": [index, list] })
}

/// `{ "Fn::GetAZs": "" }` (AZs of the deployment region)
pub fn get_azs() -> Value {
    json!({ "Fn::GetAZs": "" })
}

/// `{ "Fn::Sub": template }`
pub fn sub(template: &str) -> Value {
    json!({ "Fn::Sub": template })
}

pub fn account() -> Value {
    reference(ACCOUNT_ID)
}

pub fn region() -> Value {
    reference(REGION)
}

pub fn partition() -> Value {
    reference(PARTITION)
}

/// ARN of an AWS managed policy
pub fn managed_policy_arn(name: &str) -> Value {
    join(
        "",
        vec![
            json!("arn:"),
            partition(),
            Value::String(format!(":iam::aws:policy/{name}")),
        ],
    )
}

fn is_pseudo(name: &str) -> bool {
    name.starts_with("AWS::")
}

/// Logical ids referenced by a value
///
/// Covers `Ref`, `Fn::GetAtt` and `${...}` placeholders in `Fn::Sub`.
/// Pseudo parameters are not resources and are skipped.
pub fn references(value: &Value) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    collect_references(value, &mut found);
    found
}

fn collect_references(value: &Value, found: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) if map.len() == 1 => {
            if let Some(Value::String(target)) = map.get("Ref") {
                if !is_pseudo(target) {
                    found.insert(target.clone());
                }
                return;
            }
            if let Some(att) = map.get("Fn::GetAtt") {
                match att {
                    Value::Array(parts) => {
                        if let Some(Value::String(target)) = parts.first() {
                            found.insert(target.clone());
                        }
                    }
                    // "Resource.Attribute" form
                    Value::String(s) => {
                        if let Some((target, _)) = s.split_once('.') {
                            found.insert(target.to_string());
                        }
                    }
                    _ => {}
                }
                return;
            }
            if let Some(template) = map.get("Fn::Sub") {
                match template {
                    Value::String(s) => sub_placeholders(s, &BTreeSet::new(), found),
                    Value::Array(parts) => {
                        let locals: BTreeSet<String> = parts
                            .get(1)
                            .and_then(|v| v.as_object())
                            .map(|vars| vars.keys().cloned().collect())
                            .unwrap_or_default();
                        if let Some(Value::String(s)) = parts.first() {
                            sub_placeholders(s, &locals, found);
                        }
                        for part in parts.iter().skip(1) {
                            collect_references(part, found);
                        }
                    }
                    _ => {}
                }
                return;
            }
            for v in map.values() {
                collect_references(v, found);
            }
        }
        Value::Object(map) => {
            for v in map.values() {
                collect_references(v, found);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_references(v, found);
            }
        }
        _ => {}
    }
}

/// `${Name}` / `${Name.Attr}` placeholders in a Fn::Sub template
fn sub_placeholders(template: &str, locals: &BTreeSet<String>, found: &mut BTreeSet<String>) {
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        let name = &after[..end];
        rest = &after[end + 1..];

        // ${!Literal} is an escape
        if name.starts_with('!') {
            continue;
        }
        let target = name.split('.').next().unwrap_or(name);
        if !target.is_empty() && !is_pseudo(target) && !locals.contains(target) {
            found.insert(target.to_string());
        }
    }
}
