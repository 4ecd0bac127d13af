//! Access control grant lists and the grant rewrite operation
//!

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{model::ServiceError, store::ObjectStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    FullControl,
    Write,
    Read,
    WriteAcp,
    ReadAcp,
    NotSet,
}

impl Permission {
    /// Map the wire-style permission name; anything unrecognised is NotSet.
    pub fn from_name(name: &str) -> Self {
        match name {
            "FULL_CONTROL" => Permission::FullControl,
            "WRITE" => Permission::Write,
            "READ" => Permission::Read,
            "WRITE_ACP" => Permission::WriteAcp,
            "READ_ACP" => Permission::ReadAcp,
            _ => Permission::NotSet,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::FullControl => "FULL_CONTROL",
            Permission::Write => "WRITE",
            Permission::Read => "READ",
            Permission::WriteAcp => "WRITE_ACP",
            Permission::ReadAcp => "READ_ACP",
            Permission::NotSet => "NOT_SET",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GranteeKind {
    CanonicalUser,
    Group,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grantee {
    pub id: String,
    pub display_name: String,
    pub kind: GranteeKind,
}

impl Grantee {
    pub fn canonical_user(id: &str, display_name: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            kind: GranteeKind::CanonicalUser,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub grantee: Grantee,
    pub permission: Permission,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: String,
    pub display_name: String,
}

/// An owner plus its grant list. Never mutated in place; the rewrite
/// operation produces a fresh policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlPolicy {
    pub owner: Owner,
    pub grants: Vec<Grant>,
}

impl AccessControlPolicy {
    /// Fresh policy granting the owner full control, the state a newly
    /// created bucket or object starts with.
    pub fn owned_by(owner: Owner) -> Self {
        let grants = vec![Grant {
            grantee: Grantee::canonical_user(&owner.id, &owner.display_name),
            permission: Permission::FullControl,
        }];
        Self { owner, grants }
    }

    /// Copy of this policy with every existing grantee's kind forced to
    /// CanonicalUser and one new canonical-user grant appended.
    pub fn with_grant(&self, grantee_id: &str, permission: Permission) -> AccessControlPolicy {
        let mut grants: Vec<Grant> = self
            .grants
            .iter()
            .map(|grant| Grant {
                grantee: Grantee {
                    kind: GranteeKind::CanonicalUser,
                    ..grant.grantee.clone()
                },
                permission: grant.permission,
            })
            .collect();
        grants.push(Grant {
            grantee: Grantee::canonical_user(grantee_id, ""),
            permission,
        });
        AccessControlPolicy {
            owner: self.owner.clone(),
            grants,
        }
    }
}

fn log_policy(what: &str, policy: &AccessControlPolicy) {
    for grant in &policy.grants {
        info!(
            "{}: grantee {} '{}' has {}",
            what, grant.grantee.id, grant.grantee.display_name, grant.permission
        );
    }
}

/// Read the bucket's current policy, append a grant for `grantee_id`, write
/// the rewritten policy back, then re-read it to verify. Returns the
/// verified policy.
pub async fn grant_on_bucket(
    store: &dyn ObjectStore,
    bucket: &str,
    grantee_id: &str,
    permission: Permission,
) -> Result<AccessControlPolicy, ServiceError> {
    let current = store.get_bucket_acl(bucket).await?;
    let updated = current.with_grant(grantee_id, permission);
    store.put_bucket_acl(bucket, updated).await?;
    let verified = store.get_bucket_acl(bucket).await?;
    log_policy("updated bucket acl", &verified);
    Ok(verified)
}

/// As `grant_on_bucket`, for a single object's policy.
pub async fn grant_on_object(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    grantee_id: &str,
    permission: Permission,
) -> Result<AccessControlPolicy, ServiceError> {
    let current = store.get_object_acl(bucket, key).await?;
    let updated = current.with_grant(grantee_id, permission);
    store.put_object_acl(bucket, key, updated).await?;
    let verified = store.get_object_acl(bucket, key).await?;
    log_policy("updated object acl", &verified);
    Ok(verified)
}
