use async_trait::async_trait;
use rihla_shared::{ProviderId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::repository::StorageError;
use crate::BookingError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Guest,
    Customer,
    Provider,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::Customer => "customer",
            Role::Provider => "provider",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guest" => Ok(Role::Guest),
            "customer" => Ok(Role::Customer),
            "provider" => Ok(Role::Provider),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// The authenticated actor, threaded explicitly through every call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub id: UserId,
    pub role: Role,
    /// Set only for providers.
    pub provider_id: Option<ProviderId>,
}

impl Principal {
    pub fn guest() -> Self {
        Self {
            id: "anonymous".to_string(),
            role: Role::Guest,
            provider_id: None,
        }
    }

    pub fn customer(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            role: Role::Customer,
            provider_id: None,
        }
    }

    pub fn provider(id: impl Into<UserId>, provider_id: ProviderId) -> Self {
        Self {
            id: id.into(),
            role: Role::Provider,
            provider_id: Some(provider_id),
        }
    }

    pub fn admin(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            role: Role::Admin,
            provider_id: None,
        }
    }

    /// Principal used for callbacks from trusted collaborators (payment webhooks).
    pub fn system() -> Self {
        Self::admin("system")
    }
}

// ============================================================================
// Capabilities
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ManageOwnInventory,
    ManageAnyInventory,
    CreateBooking,
    ViewProviderBookings,
    ViewBooking,
    CancelBooking,
    ConfirmPayment,
}

/// Who owns the resource a capability is checked against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceOwner {
    pub provider_id: Option<ProviderId>,
    pub customer_id: Option<UserId>,
}

impl ResourceOwner {
    pub fn provider(provider_id: ProviderId) -> Self {
        Self {
            provider_id: Some(provider_id),
            customer_id: None,
        }
    }

    pub fn booking(provider_id: ProviderId, customer_id: impl Into<UserId>) -> Self {
        Self {
            provider_id: Some(provider_id),
            customer_id: Some(customer_id.into()),
        }
    }
}

/// Deny-by-default capability check.
pub fn authorize(
    principal: &Principal,
    capability: Capability,
    owner: Option<&ResourceOwner>,
) -> bool {
    let owns_as_provider = || match (principal.provider_id, owner.and_then(|o| o.provider_id)) {
        (Some(own), Some(resource)) => principal.role == Role::Provider && own == resource,
        _ => false,
    };
    let owns_as_customer = || {
        owner
            .and_then(|o| o.customer_id.as_deref())
            .is_some_and(|customer| customer == principal.id)
    };

    match (principal.role, capability) {
        (Role::Guest, _) => false,
        (Role::Admin, _) => true,
        (Role::Provider, Capability::ManageOwnInventory) => owns_as_provider(),
        (Role::Provider, Capability::ViewProviderBookings) => owns_as_provider(),
        (Role::Provider, Capability::ViewBooking | Capability::CancelBooking) => {
            owns_as_provider() || owns_as_customer()
        }
        (Role::Customer | Role::Provider, Capability::CreateBooking) => true,
        (Role::Customer, Capability::ViewBooking | Capability::CancelBooking) => owns_as_customer(),
        _ => false,
    }
}

/// `authorize` as a `Result`, for use with `?`.
pub fn ensure(
    principal: &Principal,
    capability: Capability,
    owner: Option<&ResourceOwner>,
) -> Result<(), BookingError> {
    if authorize(principal, capability, owner) {
        Ok(())
    } else {
        tracing::debug!(
            principal = %principal.id,
            role = %principal.role,
            ?capability,
            "Authorization denied"
        );
        Err(BookingError::Authorization(format!(
            "{} '{}' may not perform {:?}",
            principal.role, principal.id, capability
        )))
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Role assignment returned by the identity collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleGrant {
    pub role: Role,
    pub provider_id: Option<ProviderId>,
}

/// External `get_user_role(user_id)` collaborator.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    async fn get_user_role(&self, user_id: &str) -> Result<Option<RoleGrant>, StorageError>;
}

/// Verifies a bearer token and returns its subject.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<UserId, BookingError>;
}

pub struct PrincipalResolver {
    verifier: Arc<dyn TokenVerifier>,
    directory: Arc<dyn RoleDirectory>,
}

impl PrincipalResolver {
    pub fn new(verifier: Arc<dyn TokenVerifier>, directory: Arc<dyn RoleDirectory>) -> Self {
        Self {
            verifier,
            directory,
        }
    }

    /// Map a bearer token to a principal. A missing token is a guest; a role
    /// that cannot be established never yields more than guest access.
    pub async fn resolve(&self, token: Option<&str>) -> Result<Principal, BookingError> {
        let Some(token) = token else {
            return Ok(Principal::guest());
        };

        let subject = self.verifier.verify(token)?;

        let grant = self
            .directory
            .get_user_role(&subject)
            .await
            .map_err(|e| {
                tracing::warn!("Role lookup failed for {}: {}", subject, e);
                BookingError::Authentication("role could not be established".to_string())
            })?;

        let principal = match grant {
            Some(RoleGrant {
                role: Role::Provider,
                provider_id: Some(provider_id),
            }) => Principal::provider(subject, provider_id),
            Some(RoleGrant {
                role: Role::Provider,
                provider_id: None,
            }) => {
                tracing::warn!("Provider {} has no provider id; treating as guest", subject);
                Principal {
                    id: subject,
                    role: Role::Guest,
                    provider_id: None,
                }
            }
            Some(RoleGrant { role, .. }) => Principal {
                id: subject,
                role,
                provider_id: None,
            },
            None => Principal {
                id: subject,
                role: Role::Guest,
                provider_id: None,
            },
        };

        Ok(principal)
    }
}

/// In-memory role directory for local runs and tests.
#[derive(Default)]
pub struct StaticRoleDirectory {
    grants: std::sync::RwLock<HashMap<UserId, RoleGrant>>,
}

impl StaticRoleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, user_id: impl Into<UserId>, role: Role, provider_id: Option<ProviderId>) {
        if let Ok(mut grants) = self.grants.write() {
            grants.insert(user_id.into(), RoleGrant { role, provider_id });
        }
    }
}

#[async_trait]
impl RoleDirectory for StaticRoleDirectory {
    async fn get_user_role(&self, user_id: &str) -> Result<Option<RoleGrant>, StorageError> {
        let grants = self
            .grants
            .read()
            .map_err(|_| StorageError::Persistence("role directory lock poisoned".to_string()))?;
        Ok(grants.get(user_id).cloned())
    }
}
