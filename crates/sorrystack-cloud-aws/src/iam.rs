//! IAM policy documents and service roles

use crate::error::Result;
use crate::intrinsic;
use crate::naming::logical_id;
use crate::template::{CfnResource, Stack};
use serde_json::{Map, Value, json};

const POLICY_VERSION: &str = "2012-10-17";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    fn as_str(&self) -> &'static str {
        match self {
            Effect::Allow => "Allow",
            Effect::Deny => "Deny",
        }
    }
}

/// A single policy statement
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyStatement {
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<Value>,
    pub principal: Option<Value>,
    pub condition: Option<Value>,
}

impl PolicyStatement {
    pub fn allow<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            effect: Effect::Allow,
            actions: actions.into_iter().map(Into::into).collect(),
            resources: Vec::new(),
            principal: None,
            condition: None,
        }
    }

    pub fn on(mut self, resource: Value) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn principal(mut self, principal: Value) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn condition(mut self, condition: Value) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Render the statement; single-element lists collapse to scalars
    pub fn to_json(&self) -> Value {
        let mut rendered = Map::new();
        rendered.insert("Action".to_string(), collapse(self.actions.iter().map(|a| json!(a)).collect()));
        if let Some(condition) = &self.condition {
            rendered.insert("Condition".to_string(), condition.clone());
        }
        rendered.insert("Effect".to_string(), json!(self.effect.as_str()));
        if let Some(principal) = &self.principal {
            rendered.insert("Principal".to_string(), principal.clone());
        }
        if !self.resources.is_empty() {
            rendered.insert("Resource".to_string(), collapse(self.resources.clone()));
        }
        Value::Object(rendered)
    }
}

fn collapse(mut values: Vec<Value>) -> Value {
    if values.len() == 1 {
        values.remove(0)
    } else {
        Value::Array(values)
    }
}

/// `{ "Version": "2012-10-17", "Statement": [...] }`
pub fn policy_document(statements: &[PolicyStatement]) -> Value {
    json!({
        "Statement": statements.iter().map(PolicyStatement::to_json).collect::<Vec<_>>(),
        "Version": POLICY_VERSION,
    })
}

/// `{ "Service": "<service>" }`
pub fn service_principal(service: &str) -> Value {
    json!({ "Service": service })
}

/// Role assumed by an AWS service, with an optional inline default policy
#[derive(Debug, Clone)]
pub struct ServiceRole {
    path: Vec<String>,
    service: String,
    managed_policies: Vec<Value>,
    statements: Vec<PolicyStatement>,
}

impl ServiceRole {
    /// `path` is the construct path of the role (without the trailing "Resource")
    pub fn new(path: &[&str], service: &str) -> Self {
        Self {
            path: path.iter().map(|s| s.to_string()).collect(),
            service: service.to_string(),
            managed_policies: Vec::new(),
            statements: Vec::new(),
        }
    }

    pub fn with_managed_policy(mut self, name: &str) -> Self {
        self.managed_policies.push(intrinsic::managed_policy_arn(name));
        self
    }

    pub fn add_to_policy(&mut self, statement: PolicyStatement) {
        self.statements.push(statement);
    }

    pub fn logical_id(&self) -> String {
        let mut path: Vec<&str> = self.path.iter().map(String::as_str).collect();
        path.push("Resource");
        logical_id(&path)
    }

    pub fn policy_logical_id(&self) -> String {
        let mut path: Vec<&str> = self.path.iter().map(String::as_str).collect();
        path.extend(["DefaultPolicy", "Resource"]);
        logical_id(&path)
    }

    /// Add the role (and its default policy if any statements exist)
    pub fn add_to_stack(self, stack: &mut Stack) -> Result<RoleRefs> {
        let role_id = self.logical_id();
        let assume = PolicyStatement::allow(["sts:AssumeRole"]).principal(service_principal(&self.service));

        let mut properties = json!({
            "AssumeRolePolicyDocument": policy_document(&[assume]),
        });
        if !self.managed_policies.is_empty() {
            properties["ManagedPolicyArns"] = Value::Array(self.managed_policies.clone());
        }
        stack.add_resource(&role_id, CfnResource::new("AWS::IAM::Role", properties))?;

        let policy_id = if self.statements.is_empty() {
            None
        } else {
            let policy_id = self.policy_logical_id();
            stack.add_resource(
                &policy_id,
                CfnResource::new(
                    "AWS::IAM::Policy",
                    json!({
                        "PolicyDocument": policy_document(&self.statements),
                        "PolicyName": policy_id,
                        "Roles": [intrinsic::reference(&role_id)],
                    }),
                ),
            )?;
            Some(policy_id)
        };

        Ok(RoleRefs { role_id, policy_id })
    }
}

/// Logical ids produced by `ServiceRole::add_to_stack`
#[derive(Debug, Clone)]
pub struct RoleRefs {
    pub role_id: String,
    pub policy_id: Option<String>,
}

impl RoleRefs {
    pub fn arn(&self) -> Value {
        intrinsic::get_att(&self.role_id, "Arn")
    }
}
