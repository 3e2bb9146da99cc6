use anyhow::Result;
use serde::{Deserialize, Serialize};

/// kubectl shipped by the control plane snap
pub const KUBECTL: &str = "/snap/bin/kubectl";

/// Username the test principal is mapped to
pub const TEST_USER: &str = "test-user";

/// ObjectMeta is metadata that all persisted resources must have
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObjectMeta {
  /// Name must be unique within a namespace
  pub name: String,

  /// Namespace defines the space within which each name must be unique.
  /// The server default applies when omitted
  #[serde(skip_serializing_if = "Option::is_none")]
  pub namespace: Option<String>,
}

impl ObjectMeta {
  fn named(name: &str) -> Self {
    ObjectMeta {
      name: name.to_owned(),
      namespace: None,
    }
  }
}

/// IAMIdentityMapping maps an IAM principal to a Kubernetes username and groups
///
/// Served by the aws-iam-authenticator CRD `iamidentitymappings.iamauthenticator.k8s.aws`
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IamIdentityMapping {
  api_version: String,
  kind: String,
  metadata: ObjectMeta,
  spec: IamIdentityMappingSpec,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IamIdentityMappingSpec {
  /// ARN of the IAM user or role
  pub arn: String,

  pub username: String,

  pub groups: Vec<String>,
}

impl IamIdentityMapping {
  /// Mapping of `arn` to the test user with read only (`view`) group membership
  pub fn new(arn: &str) -> Self {
    IamIdentityMapping {
      api_version: "iamauthenticator.k8s.aws/v1alpha1".to_owned(),
      kind: "IAMIdentityMapping".to_owned(),
      metadata: ObjectMeta::named("kubernetes-admin"),
      spec: IamIdentityMappingSpec {
        arn: arn.to_owned(),
        username: TEST_USER.to_owned(),
        groups: vec!["view".to_owned()],
      },
    }
  }
}

/// Role is a namespaced, logical grouping of PolicyRules
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
  api_version: String,
  kind: String,
  metadata: ObjectMeta,
  rules: Vec<PolicyRule>,
}

/// PolicyRule holds information that describes a policy rule
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
  /// APIGroups is the name of the APIGroup that contains the resources. "" represents the core API group
  pub api_groups: Vec<String>,

  pub resources: Vec<String>,

  pub verbs: Vec<String>,
}

impl Role {
  /// Read only access to pods in the namespace the role is created in
  pub fn pod_reader() -> Self {
    Role {
      api_version: "rbac.authorization.k8s.io/v1".to_owned(),
      kind: "Role".to_owned(),
      metadata: ObjectMeta::named("pod-reader"),
      rules: vec![PolicyRule {
        api_groups: vec!["".to_owned()],
        resources: vec!["pods".to_owned()],
        verbs: vec!["get".to_owned(), "list".to_owned(), "watch".to_owned()],
      }],
    }
  }
}

/// RoleBinding references a role and binds it to subjects within a namespace
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleBinding {
  api_version: String,
  kind: String,
  metadata: ObjectMeta,
  subjects: Vec<Subject>,
  role_ref: RoleRef,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
  pub kind: String,
  pub name: String,
  pub api_group: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRef {
  pub kind: String,
  pub name: String,
  pub api_group: String,
}

impl RoleBinding {
  /// Bind the test user to `pod-reader` in the `default` namespace
  pub fn read_pods() -> Self {
    RoleBinding {
      api_version: "rbac.authorization.k8s.io/v1".to_owned(),
      kind: "RoleBinding".to_owned(),
      metadata: ObjectMeta {
        name: "read-pods".to_owned(),
        namespace: Some("default".to_owned()),
      },
      subjects: vec![Subject {
        kind: "User".to_owned(),
        name: TEST_USER.to_owned(),
        api_group: "rbac.authorization.k8s.io".to_owned(),
      }],
      role_ref: RoleRef {
        kind: "Role".to_owned(),
        name: "pod-reader".to_owned(),
        api_group: "rbac.authorization.k8s.io".to_owned(),
      },
    }
  }
}

/// Multi-document YAML submitted with `kubectl apply`
#[derive(Debug, Default)]
pub struct Manifest {
  documents: Vec<String>,
}

impl Manifest {
  pub fn new() -> Self {
    Manifest::default()
  }

  pub fn push<T: Serialize>(mut self, resource: &T) -> Result<Self> {
    self.documents.push(serde_yaml::to_string(resource)?);
    Ok(self)
  }

  pub fn render(&self) -> String {
    self.documents.join("---\n")
  }

  /// Shell command that applies the manifest on a control plane unit
  ///
  /// The heredoc delimiter is quoted so nothing in the manifest is expanded by the shell
  pub fn apply_command(&self) -> String {
    format!("{KUBECTL} apply -f - << 'EOF'\n{}EOF", self.render())
  }
}

#[cfg(test)]
mod tests {
  use serde_yaml::Value;

  use super::*;

  const ARN: &str = "arn:aws:iam::123456789012:role/k8s-view-role";

  fn documents(rendered: &str) -> Vec<Value> {
    rendered
      .split("---\n")
      .map(|doc| serde_yaml::from_str(doc).unwrap())
      .collect()
  }

  #[test]
  fn it_renders_identity_mapping() {
    let manifest = Manifest::new().push(&IamIdentityMapping::new(ARN)).unwrap();
    insta::assert_snapshot!(manifest.apply_command(), @r###"
/snap/bin/kubectl apply -f - << 'EOF'
apiVersion: iamauthenticator.k8s.aws/v1alpha1
kind: IAMIdentityMapping
metadata:
  name: kubernetes-admin
spec:
  arn: arn:aws:iam::123456789012:role/k8s-view-role
  username: test-user
  groups:
  - view
EOF
"###);
  }

  #[test]
  fn it_renders_rbac_grant() {
    let manifest = Manifest::new()
      .push(&Role::pod_reader())
      .unwrap()
      .push(&RoleBinding::read_pods())
      .unwrap();
    insta::assert_snapshot!(manifest.apply_command(), @r###"
/snap/bin/kubectl apply -f - << 'EOF'
apiVersion: rbac.authorization.k8s.io/v1
kind: Role
metadata:
  name: pod-reader
rules:
- apiGroups:
  - ''
  resources:
  - pods
  verbs:
  - get
  - list
  - watch
---
apiVersion: rbac.authorization.k8s.io/v1
kind: RoleBinding
metadata:
  name: read-pods
  namespace: default
subjects:
- kind: User
  name: test-user
  apiGroup: rbac.authorization.k8s.io
roleRef:
  kind: Role
  name: pod-reader
  apiGroup: rbac.authorization.k8s.io
EOF
"###);
  }

  #[test]
  fn it_renders_parseable_documents() {
    let manifest = Manifest::new()
      .push(&Role::pod_reader())
      .unwrap()
      .push(&RoleBinding::read_pods())
      .unwrap();
    let docs = documents(&manifest.render());
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0]["rules"][0]["apiGroups"][0], "");
    assert_eq!(docs[1]["metadata"]["namespace"], "default");
  }

  #[test]
  fn it_wraps_manifest_in_heredoc() {
    let manifest = Manifest::new().push(&IamIdentityMapping::new(ARN)).unwrap();
    let cmd = manifest.apply_command();
    assert!(cmd.starts_with("/snap/bin/kubectl apply -f - << 'EOF'\n"));
    assert!(cmd.ends_with("\nEOF"));
    assert!(cmd.contains(ARN));
  }

  #[test]
  fn it_renders_identically_for_reapply() {
    let first = Manifest::new().push(&IamIdentityMapping::new(ARN)).unwrap();
    let second = Manifest::new().push(&IamIdentityMapping::new(ARN)).unwrap();
    assert_eq!(first.apply_command(), second.apply_command());
  }
}
