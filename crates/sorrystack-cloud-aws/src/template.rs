//! CloudFormation template model
//!
//! `Stack` holds rendered resources keyed by logical id. Constructs add
//! resources to it; escape hatches (`add_property_override`,
//! `add_deletion_override`, `remove_resource`) edit the raw properties after
//! the fact. `to_document` renders the final template.

use crate::error::{AwsError, Result};
use crate::intrinsic;
use serde_json::{Map, Value, json};
use sorrystack_cloud::{ResourceConfig, ResourceSet};
use std::collections::{BTreeMap, BTreeSet};

const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// A single template resource
#[derive(Debug, Clone, PartialEq)]
pub struct CfnResource {
    pub resource_type: String,
    pub properties: Map<String, Value>,
    pub depends_on: BTreeSet<String>,
    pub deletion_policy: Option<String>,
    pub update_replace_policy: Option<String>,
}

impl CfnResource {
    pub fn new(resource_type: impl Into<String>, properties: Value) -> Self {
        let properties = match properties {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            resource_type: resource_type.into(),
            properties,
            depends_on: BTreeSet::new(),
            deletion_policy: None,
            update_replace_policy: None,
        }
    }

    pub fn depends_on(mut self, logical_id: impl Into<String>) -> Self {
        self.depends_on.insert(logical_id.into());
        self
    }

    /// Set both DeletionPolicy and UpdateReplacePolicy
    pub fn with_removal_policy(mut self, policy: &str) -> Self {
        self.deletion_policy = Some(policy.to_string());
        self.update_replace_policy = Some(policy.to_string());
        self
    }

    /// Logical ids this resource depends on (explicit and via references)
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut deps = intrinsic::references(&Value::Object(self.properties.clone()));
        deps.extend(self.depends_on.iter().cloned());
        deps
    }

    fn attributes(&self) -> BTreeMap<String, Value> {
        let mut attributes = BTreeMap::new();
        if !self.depends_on.is_empty() {
            attributes.insert("DependsOn".to_string(), json!(self.depends_on));
        }
        if let Some(policy) = &self.deletion_policy {
            attributes.insert("DeletionPolicy".to_string(), json!(policy));
        }
        if let Some(policy) = &self.update_replace_policy {
            attributes.insert("UpdateReplacePolicy".to_string(), json!(policy));
        }
        attributes
    }

    fn to_json(&self) -> Value {
        let mut rendered = Map::new();
        rendered.insert("Type".to_string(), json!(self.resource_type));
        if !self.properties.is_empty() {
            rendered.insert(
                "Properties".to_string(),
                Value::Object(self.properties.clone()),
            );
        }
        rendered.extend(self.attributes());
        Value::Object(rendered)
    }
}

/// A template output
#[derive(Debug, Clone, PartialEq)]
pub struct CfnOutput {
    pub value: Value,
    pub description: Option<String>,
}

impl CfnOutput {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            description: None,
        }
    }
}

/// CloudFormation stack being synthesized
#[derive(Debug, Clone, Default)]
pub struct Stack {
    pub name: String,
    pub description: Option<String>,
    resources: BTreeMap<String, CfnResource>,
    outputs: BTreeMap<String, CfnOutput>,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a resource; logical ids must be unique
    pub fn add_resource(&mut self, logical_id: impl Into<String>, resource: CfnResource) -> Result<()> {
        let logical_id = logical_id.into();
        if self.resources.contains_key(&logical_id) {
            return Err(AwsError::DuplicateLogicalId(logical_id));
        }
        tracing::trace!(logical_id = %logical_id, resource_type = %resource.resource_type, "Adding resource");
        self.resources.insert(logical_id, resource);
        Ok(())
    }

    pub fn add_output(&mut self, logical_id: impl Into<String>, output: CfnOutput) {
        self.outputs.insert(logical_id.into(), output);
    }

    pub fn resource(&self, logical_id: &str) -> Option<&CfnResource> {
        self.resources.get(logical_id)
    }

    pub fn resource_mut(&mut self, logical_id: &str) -> Result<&mut CfnResource> {
        self.resources
            .get_mut(logical_id)
            .ok_or_else(|| AwsError::ResourceNotFound(logical_id.to_string()))
    }

    pub fn contains(&self, logical_id: &str) -> bool {
        self.resources.contains_key(logical_id)
    }

    pub fn resources(&self) -> impl Iterator<Item = (&String, &CfnResource)> {
        self.resources.iter()
    }

    pub fn outputs(&self) -> impl Iterator<Item = (&String, &CfnOutput)> {
        self.outputs.iter()
    }

    /// Remove a resource together with explicit DependsOn entries pointing at it
    pub fn remove_resource(&mut self, logical_id: &str) -> Option<CfnResource> {
        let removed = self.resources.remove(logical_id)?;
        for resource in self.resources.values_mut() {
            resource.depends_on.remove(logical_id);
        }
        tracing::debug!(logical_id, "Removed resource");
        Some(removed)
    }

    /// Add an explicit dependency
    pub fn add_dependency(&mut self, from: &str, to: &str) -> Result<()> {
        if !self.contains(to) {
            return Err(AwsError::ResourceNotFound(to.to_string()));
        }
        self.resource_mut(from)?.depends_on.insert(to.to_string());
        Ok(())
    }

    /// Set a raw property, addressed by a dot-separated path
    ///
    /// Numeric segments index into arrays; missing object keys are created.
    /// `\.` escapes a literal dot within a key.
    pub fn add_property_override(&mut self, logical_id: &str, path: &str, value: Value) -> Result<()> {
        self.edit_properties(logical_id, path, |root, parents, last| {
            set_path(root, parents, last, value)
        })?;
        tracing::debug!(logical_id, path, "Applied property override");
        Ok(())
    }

    /// Remove a raw property addressed by a dot-separated path
    pub fn add_deletion_override(&mut self, logical_id: &str, path: &str) -> Result<()> {
        self.edit_properties(logical_id, path, remove_path)?;
        tracing::debug!(logical_id, path, "Applied deletion override");
        Ok(())
    }

    fn edit_properties<F>(&mut self, logical_id: &str, path: &str, edit: F) -> Result<()>
    where
        F: FnOnce(&mut Value, &[String], &str) -> std::result::Result<(), String>,
    {
        let invalid = |message: String| AwsError::InvalidOverride {
            resource: logical_id.to_string(),
            path: path.to_string(),
            message,
        };
        let segments = split_path(path);
        let Some((last, parents)) = segments.split_last() else {
            return Err(invalid("empty path".to_string()));
        };

        let resource = self.resource_mut(logical_id)?;
        let mut root = Value::Object(std::mem::take(&mut resource.properties));
        let result = edit(&mut root, parents, last.as_str());
        if let Value::Object(map) = root {
            resource.properties = map;
        }
        result.map_err(invalid)
    }

    /// Check references and dependency cycles
    pub fn validate(&self) -> Result<()> {
        for (id, resource) in &self.resources {
            for dep in resource.dependencies() {
                if !self.resources.contains_key(&dep) {
                    return Err(AwsError::DanglingReference {
                        from: id.clone(),
                        to: dep,
                    });
                }
            }
        }
        for (id, output) in &self.outputs {
            for dep in intrinsic::references(&output.value) {
                if !self.resources.contains_key(&dep) {
                    return Err(AwsError::DanglingReference {
                        from: format!("Outputs.{id}"),
                        to: dep,
                    });
                }
            }
        }
        self.dependency_order().map(|_| ())
    }

    /// Logical ids in creation order
    ///
    /// Kahn's algorithm; among ready resources the smallest id goes first,
    /// so the order is deterministic.
    pub fn dependency_order(&self) -> Result<Vec<String>> {
        let mut remaining: BTreeMap<&str, BTreeSet<String>> = self
            .resources
            .iter()
            .map(|(id, r)| {
                let deps = r
                    .dependencies()
                    .into_iter()
                    .filter(|d| self.resources.contains_key(d))
                    .collect();
                (id.as_str(), deps)
            })
            .collect();

        let mut order = Vec::with_capacity(remaining.len());
        let mut ready: BTreeSet<String> = remaining
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(id, _)| id.to_string())
            .collect();

        while let Some(next) = ready.pop_first() {
            remaining.remove(next.as_str());
            for (id, deps) in remaining.iter_mut() {
                if deps.remove(&next) && deps.is_empty() {
                    ready.insert(id.to_string());
                }
            }
            order.push(next);
        }

        if !remaining.is_empty() {
            return Err(AwsError::DependencyCycle(
                remaining.keys().map(|id| id.to_string()).collect(),
            ));
        }
        Ok(order)
    }

    /// Render the template document
    pub fn to_document(&self) -> Value {
        let resources: Map<String, Value> = self
            .resources
            .iter()
            .map(|(id, r)| (id.clone(), r.to_json()))
            .collect();

        let mut document = Map::new();
        document.insert(
            "AWSTemplateFormatVersion".to_string(),
            json!(TEMPLATE_FORMAT_VERSION),
        );
        if let Some(description) = &self.description {
            document.insert("Description".to_string(), json!(description));
        }
        document.insert("Resources".to_string(), Value::Object(resources));

        if !self.outputs.is_empty() {
            let outputs: Map<String, Value> = self
                .outputs
                .iter()
                .map(|(id, output)| {
                    let mut rendered = Map::new();
                    if let Some(description) = &output.description {
                        rendered.insert("Description".to_string(), json!(description));
                    }
                    rendered.insert("Value".to_string(), output.value.clone());
                    (id.clone(), Value::Object(rendered))
                })
                .collect();
            document.insert("Outputs".to_string(), Value::Object(outputs));
        }

        Value::Object(document)
    }

    /// Resources as a provider-neutral set for planning
    pub fn resource_set(&self, provider: &str) -> ResourceSet {
        self.resources
            .iter()
            .map(|(id, r)| {
                let mut config = ResourceConfig::new(
                    r.resource_type.clone(),
                    id.clone(),
                    provider,
                    Value::Object(r.properties.clone()),
                );
                config.attributes = r.attributes();
                config
            })
            .collect()
    }
}

fn split_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'.') => {
                current.push('.');
                chars.next();
            }
            '.' => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    segments.push(current);
    segments.retain(|s| !s.is_empty());
    segments
}

fn array_index(segment: &str, len: usize) -> std::result::Result<usize, String> {
    let index: usize = segment
        .parse()
        .map_err(|_| format!("'{segment}' is not an array index"))?;
    if index >= len {
        return Err(format!("index {index} out of range (len {len})"));
    }
    Ok(index)
}

/// Descend one segment, creating missing object keys
fn step<'a>(value: &'a mut Value, segment: &str) -> std::result::Result<&'a mut Value, String> {
    match value {
        Value::Object(map) => Ok(map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()))),
        Value::Array(items) => {
            let index = array_index(segment, items.len())?;
            Ok(&mut items[index])
        }
        _ => Err(format!("cannot descend into '{segment}'")),
    }
}

fn set_path(
    root: &mut Value,
    parents: &[String],
    last: &str,
    value: Value,
) -> std::result::Result<(), String> {
    let mut node = root;
    for segment in parents {
        node = step(node, segment)?;
    }
    match node {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
        }
        Value::Array(items) => {
            let index = array_index(last, items.len())?;
            items[index] = value;
        }
        _ => return Err(format!("cannot set '{last}' on a scalar value")),
    }
    Ok(())
}

fn remove_path(root: &mut Value, parents: &[String], last: &str) -> std::result::Result<(), String> {
    let mut node = root;
    for segment in parents {
        node = match node {
            Value::Object(map) => map.get_mut(segment.as_str()),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
            _ => None,
        }
        .ok_or_else(|| format!("'{segment}' not found"))?;
    }
    match node {
        Value::Object(map) => {
            if map.remove(last).is_none() {
                return Err(format!("'{last}' not found"));
            }
        }
        Value::Array(items) => {
            let index = array_index(last, items.len())?;
            items.remove(index);
        }
        _ => return Err(format!("'{last}' has no container")),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn distribution() -> CfnResource {
        CfnResource::new(
            "AWS::CloudFront::Distribution",
            json!({
                "DistributionConfig": {
                    "Origins": [{
                        "Id": "Origin1",
                        "S3OriginConfig": { "OriginAccessIdentity": "legacy" }
                    }]
                }
            }),
        )
    }

    #[test]
    fn test_property_override_indexes_arrays() {
        let mut stack = Stack::new("Test");
        stack.add_resource("Dist", distribution()).unwrap();
        stack
            .add_property_override(
                "Dist",
                "DistributionConfig.Origins.0.S3OriginConfig.OriginAccessIdentity",
                json!(""),
            )
            .unwrap();
        stack
            .add_property_override(
                "Dist",
                "DistributionConfig.Origins.0.OriginAccessControlId",
                json!("oac-id"),
            )
            .unwrap();

        let origin = &stack.resource("Dist").unwrap().properties["DistributionConfig"]["Origins"][0];
        assert_eq!(origin["S3OriginConfig"]["OriginAccessIdentity"], json!(""));
        assert_eq!(origin["OriginAccessControlId"], json!("oac-id"));
        assert_eq!(origin["Id"], json!("Origin1"));
    }

    #[test]
    fn test_property_override_creates_missing_keys() {
        let mut stack = Stack::new("Test");
        stack
            .add_resource("Bucket", CfnResource::new("AWS::S3::Bucket", json!({})))
            .unwrap();
        stack
            .add_property_override("Bucket", "VersioningConfiguration.Status", json!("Enabled"))
            .unwrap();
        assert_eq!(
            stack.resource("Bucket").unwrap().properties["VersioningConfiguration"]["Status"],
            json!("Enabled")
        );
    }

    #[test]
    fn test_property_override_out_of_range() {
        let mut stack = Stack::new("Test");
        stack.add_resource("Dist", distribution()).unwrap();
        let result = stack.add_property_override("Dist", "DistributionConfig.Origins.3.Id", json!("x"));
        assert!(matches!(result, Err(AwsError::InvalidOverride { .. })));
    }

    #[test]
    fn test_escaped_dot_in_path() {
        assert_eq!(split_path(r"Tags.aws\.cdk.Value"), vec!["Tags", "aws.cdk", "Value"]);
    }

    #[test]
    fn test_deletion_override() {
        let mut stack = Stack::new("Test");
        stack.add_resource("Dist", distribution()).unwrap();
        stack
            .add_deletion_override("Dist", "DistributionConfig.Origins.0.S3OriginConfig")
            .unwrap();
        let origin = &stack.resource("Dist").unwrap().properties["DistributionConfig"]["Origins"][0];
        assert!(origin.get("S3OriginConfig").is_none());

        assert!(stack.add_deletion_override("Dist", "Nope.Missing").is_err());
        // existing properties survive a failed override
        assert!(stack.resource("Dist").unwrap().properties.contains_key("DistributionConfig"));
    }

    #[test]
    fn test_duplicate_logical_id() {
        let mut stack = Stack::new("Test");
        stack.add_resource("A", CfnResource::new("AWS::SNS::Topic", json!({}))).unwrap();
        assert!(matches!(
            stack.add_resource("A", CfnResource::new("AWS::SNS::Topic", json!({}))),
            Err(AwsError::DuplicateLogicalId(_))
        ));
    }

    #[test]
    fn test_dependency_order_and_dangling() {
        let mut stack = Stack::new("Test");
        stack
            .add_resource("Vpc", CfnResource::new("AWS::EC2::VPC", json!({})))
            .unwrap();
        stack
            .add_resource(
                "Subnet",
                CfnResource::new("AWS::EC2::Subnet", json!({ "VpcId": intrinsic::reference("Vpc") })),
            )
            .unwrap();
        stack
            .add_resource(
                "Association",
                CfnResource::new(
                    "AWS::EC2::SubnetRouteTableAssociation",
                    json!({ "SubnetId": intrinsic::reference("Subnet") }),
                ),
            )
            .unwrap();

        assert_eq!(stack.dependency_order().unwrap(), vec!["Vpc", "Subnet", "Association"]);
        stack.validate().unwrap();

        stack.remove_resource("Vpc");
        assert!(matches!(
            stack.validate(),
            Err(AwsError::DanglingReference { .. })
        ));
    }

    #[test]
    fn test_cycle_detected() {
        let mut stack = Stack::new("Test");
        stack
            .add_resource("A", CfnResource::new("T", json!({ "X": intrinsic::reference("B") })))
            .unwrap();
        stack
            .add_resource("B", CfnResource::new("T", json!({ "X": intrinsic::get_att("A", "Arn") })))
            .unwrap();
        assert!(matches!(stack.validate(), Err(AwsError::DependencyCycle(_))));
    }

    #[test]
    fn test_document_rendering() {
        let mut stack = Stack::new("Test");
        stack.description = Some("demo".to_string());
        stack
            .add_resource(
                "Bucket",
                CfnResource::new("AWS::S3::Bucket", json!({})).with_removal_policy("Delete"),
            )
            .unwrap();
        stack.add_output("BucketName", CfnOutput::new(intrinsic::reference("Bucket")));

        let doc = stack.to_document();
        assert_eq!(doc["AWSTemplateFormatVersion"], json!("2010-09-09"));
        assert_eq!(doc["Resources"]["Bucket"]["DeletionPolicy"], json!("Delete"));
        assert!(doc["Resources"]["Bucket"].get("Properties").is_none());
        assert_eq!(doc["Outputs"]["BucketName"]["Value"], json!({ "Ref": "Bucket" }));

        let set = stack.resource_set("aws");
        assert_eq!(
            set.get("Bucket").unwrap().attributes.get("UpdateReplacePolicy"),
            Some(&json!("Delete"))
        );
    }
}
