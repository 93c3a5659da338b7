//! Tessera Access Policy
//!
//! Access decisions consumed (never defined) by the document core. Every
//! decision is a value carrying the cacheability of whatever it depended
//! on, so that denied reads can be folded into the node tree while the
//! response still varies correctly.
//!
//! Key Features:
//! - `AccessResult` value type with cacheability on both outcomes
//! - `AccessPolicy` collaborator trait for item, create and field checks
//! - Role-based policy with per-type grants and field-level rules
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::descriptor::{FieldDefinition, ResourceDescriptor};
use crate::item::ContentItem;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tessera_common::Cacheability;

/// Cache context for decisions that depend on the account's roles.
pub const ROLES_CACHE_CONTEXT: &str = "user.roles";

// =============================================================================
// Operations
// =============================================================================

/// Operations an access check can be asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    View,
    ViewLabel,
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::View => "view",
            Operation::ViewLabel => "view label",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Access Result
// =============================================================================

/// Outcome of an access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessResult {
    Allowed { cacheability: Cacheability },
    Denied { reason: String, cacheability: Cacheability },
}

impl AccessResult {
    pub fn allowed() -> Self {
        AccessResult::Allowed {
            cacheability: Cacheability::new(),
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        AccessResult::Denied {
            reason: reason.into(),
            cacheability: Cacheability::new(),
        }
    }

    /// Allowed when `condition` holds, denied with `reason` otherwise.
    pub fn allowed_if(condition: bool, reason: impl Into<String>) -> Self {
        if condition {
            Self::allowed()
        } else {
            Self::denied(reason)
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessResult::Allowed { .. })
    }

    pub fn is_denied(&self) -> bool {
        !self.is_allowed()
    }

    pub fn cacheability(&self) -> &Cacheability {
        match self {
            AccessResult::Allowed { cacheability } | AccessResult::Denied { cacheability, .. } => {
                cacheability
            }
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            AccessResult::Allowed { .. } => None,
            AccessResult::Denied { reason, .. } => Some(reason),
        }
    }

    /// Fold extra cache metadata into the decision.
    pub fn add_cacheability(self, extra: &Cacheability) -> Self {
        match self {
            AccessResult::Allowed { cacheability } => AccessResult::Allowed {
                cacheability: cacheability.merge(extra),
            },
            AccessResult::Denied {
                reason,
                cacheability,
            } => AccessResult::Denied {
                reason,
                cacheability: cacheability.merge(extra),
            },
        }
    }

    /// Conjunction: denied if either side is denied (first reason wins);
    /// cacheability of both sides is always kept.
    pub fn and(self, other: AccessResult) -> Self {
        let merged = self.cacheability().merge(other.cacheability());
        match (self, other) {
            (AccessResult::Denied { reason, .. }, _) | (_, AccessResult::Denied { reason, .. }) => {
                AccessResult::Denied {
                    reason,
                    cacheability: merged,
                }
            }
            _ => AccessResult::Allowed {
                cacheability: merged,
            },
        }
    }
}

// =============================================================================
// Account
// =============================================================================

/// The party a request is evaluated for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: Option<String>,
    pub roles: BTreeSet<String>,
}

impl Account {
    pub fn anonymous() -> Self {
        Self {
            id: None,
            roles: BTreeSet::from(["anonymous".to_string()]),
        }
    }

    pub fn authenticated<I, S>(id: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut all: BTreeSet<String> = roles.into_iter().map(Into::into).collect();
        all.insert("authenticated".to_string());
        Self {
            id: Some(id.into()),
            roles: all,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.id.is_none()
    }
}

impl Default for Account {
    fn default() -> Self {
        Self::anonymous()
    }
}

// =============================================================================
// Access Policy Trait
// =============================================================================

/// Capability-check collaborator.
pub trait AccessPolicy: Send + Sync {
    /// Access to an existing item as a whole.
    fn item_access(
        &self,
        account: &Account,
        descriptor: &ResourceDescriptor,
        item: &ContentItem,
        operation: Operation,
    ) -> AccessResult;

    /// Access to create a new item of a subtype.
    fn create_access(&self, account: &Account, descriptor: &ResourceDescriptor) -> AccessResult;

    /// Access to one field. `item` is absent while creating.
    fn field_access(
        &self,
        account: &Account,
        descriptor: &ResourceDescriptor,
        field: &FieldDefinition,
        item: Option<&ContentItem>,
        operation: Operation,
    ) -> AccessResult;
}

/// Policy that allows everything. Useful for tests and trusted tooling.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn item_access(
        &self,
        _account: &Account,
        _descriptor: &ResourceDescriptor,
        _item: &ContentItem,
        _operation: Operation,
    ) -> AccessResult {
        AccessResult::allowed()
    }

    fn create_access(&self, _account: &Account, _descriptor: &ResourceDescriptor) -> AccessResult {
        AccessResult::allowed()
    }

    fn field_access(
        &self,
        _account: &Account,
        _descriptor: &ResourceDescriptor,
        _field: &FieldDefinition,
        _item: Option<&ContentItem>,
        _operation: Operation,
    ) -> AccessResult {
        AccessResult::allowed()
    }
}

// =============================================================================
// Role-Based Policy
// =============================================================================

/// Operations a role may perform on one resource type (`*` for any).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub resource_type: String,
    pub operations: Vec<Operation>,
}

impl Permission {
    pub fn new(resource_type: impl Into<String>, operations: Vec<Operation>) -> Self {
        Self {
            resource_type: resource_type.into(),
            operations,
        }
    }
}

/// A role with grants and field rules. Field rules use
/// `<public type>.<public field>` with `*` allowed as the type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    /// Fields this role may not read.
    #[serde(default)]
    pub hidden_fields: Vec<String>,
    /// Fields this role may not write.
    #[serde(default)]
    pub locked_fields: Vec<String>,
    #[serde(default)]
    pub view_unpublished: bool,
}

impl RoleDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            permissions: Vec::new(),
            hidden_fields: Vec::new(),
            locked_fields: Vec::new(),
            view_unpublished: false,
        }
    }

    pub fn grant(mut self, resource_type: impl Into<String>, operations: Vec<Operation>) -> Self {
        self.permissions.push(Permission::new(resource_type, operations));
        self
    }

    pub fn hide_field(mut self, rule: impl Into<String>) -> Self {
        self.hidden_fields.push(rule.into());
        self
    }

    pub fn lock_field(mut self, rule: impl Into<String>) -> Self {
        self.locked_fields.push(rule.into());
        self
    }

    pub fn with_view_unpublished(mut self) -> Self {
        self.view_unpublished = true;
        self
    }

    /// Check if this role has a specific permission.
    pub fn has_permission(&self, resource_type: &str, operation: Operation) -> bool {
        self.permissions.iter().any(|p| {
            (p.resource_type == "*" || p.resource_type == resource_type)
                && p.operations.contains(&operation)
        })
    }

    fn matches_rule(rules: &[String], resource_type: &str, field: &str) -> bool {
        rules.iter().any(|rule| match rule.split_once('.') {
            Some((t, f)) => (t == "*" || t == resource_type) && f == field,
            None => false,
        })
    }

    pub fn hides(&self, resource_type: &str, field: &str) -> bool {
        Self::matches_rule(&self.hidden_fields, resource_type, field)
    }

    pub fn locks(&self, resource_type: &str, field: &str) -> bool {
        Self::matches_rule(&self.locked_fields, resource_type, field)
    }
}

/// Policy evaluating an account's roles.
pub struct RolePolicy {
    roles: HashMap<String, RoleDefinition>,
}

impl RolePolicy {
    /// Create a policy from role definitions.
    pub fn new(roles: Vec<RoleDefinition>) -> Self {
        Self {
            roles: roles.into_iter().map(|r| (r.name.clone(), r)).collect(),
        }
    }

    fn account_roles<'a>(&'a self, account: &'a Account) -> impl Iterator<Item = &'a RoleDefinition> {
        account.roles.iter().filter_map(|name| self.roles.get(name))
    }

    fn check_permission(&self, account: &Account, resource_type: &str, operation: Operation) -> bool {
        self.account_roles(account)
            .any(|role| role.has_permission(resource_type, operation))
    }

    fn roles_cacheability() -> Cacheability {
        Cacheability::new().with_context(ROLES_CACHE_CONTEXT)
    }
}

impl AccessPolicy for RolePolicy {
    fn item_access(
        &self,
        account: &Account,
        descriptor: &ResourceDescriptor,
        item: &ContentItem,
        operation: Operation,
    ) -> AccessResult {
        let resource_type = descriptor.public_type();
        let item_cacheability = Self::roles_cacheability().with_tag(item.cache_tag());

        let granted = match operation {
            Operation::ViewLabel => {
                self.check_permission(account, resource_type, Operation::ViewLabel)
                    || self.check_permission(account, resource_type, Operation::View)
            }
            other => self.check_permission(account, resource_type, other),
        };
        if !granted {
            return AccessResult::denied(format!(
                "The '{}' permission is required on {}.",
                operation, resource_type
            ))
            .add_cacheability(&item_cacheability);
        }

        if operation == Operation::View && !item.is_published() {
            let bypass = self.account_roles(account).any(|r| r.view_unpublished);
            return AccessResult::allowed_if(bypass, "The item is unpublished.")
                .add_cacheability(&item_cacheability);
        }

        AccessResult::allowed().add_cacheability(&item_cacheability)
    }

    fn create_access(&self, account: &Account, descriptor: &ResourceDescriptor) -> AccessResult {
        AccessResult::allowed_if(
            self.check_permission(account, descriptor.public_type(), Operation::Create),
            format!(
                "The 'create' permission is required on {}.",
                descriptor.public_type()
            ),
        )
        .add_cacheability(&Self::roles_cacheability())
    }

    fn field_access(
        &self,
        account: &Account,
        descriptor: &ResourceDescriptor,
        field: &FieldDefinition,
        _item: Option<&ContentItem>,
        operation: Operation,
    ) -> AccessResult {
        let resource_type = descriptor.public_type();
        let name = field.public_name();
        let mut roles = self.account_roles(account).peekable();
        if roles.peek().is_none() {
            return AccessResult::allowed().add_cacheability(&Self::roles_cacheability());
        }

        // The most permissive role wins: a field is only denied when every
        // role of the account restricts it.
        let restricted = match operation {
            Operation::View | Operation::ViewLabel => roles.all(|r| r.hides(resource_type, name)),
            Operation::Create | Operation::Update => roles.all(|r| r.locks(resource_type, name)),
            Operation::Delete => false,
        };
        AccessResult::allowed_if(
            !restricted,
            format!("The '{}' field of {} may not be accessed.", name, resource_type),
        )
        .add_cacheability(&Self::roles_cacheability())
    }
}

// =============================================================================
// Tests
// =============================================================================
