use serde::{Deserialize, Serialize};

use astrocat_auth::{
    Caller, PrincipalId, ProvisioningDescriptor, ResourceContext, Role, SecondFactorStatus, Verified,
};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    /// A missing code is checked (and rejected) like any other wrong code.
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthzCheckRequest {
    pub resource: String,
    pub action: String,
    /// Owning principals of the target record, when there is one.
    #[serde(default)]
    pub owners: Vec<PrincipalId>,
}

impl AuthzCheckRequest {
    pub fn context(&self) -> ResourceContext {
        self.owners.iter().copied().collect()
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct EnrollResponse {
    pub provisioning_uri: String,
    pub issuer: String,
    pub account_name: String,
}

impl From<ProvisioningDescriptor> for EnrollResponse {
    fn from(d: ProvisioningDescriptor) -> Self {
        Self {
            provisioning_uri: d.uri,
            issuer: d.issuer,
            account_name: d.account_name,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub status: &'static str,
    pub expires_in_seconds: i64,
}

impl From<Verified> for VerifyResponse {
    fn from(v: Verified) -> Self {
        Self {
            status: "success",
            expires_in_seconds: v.expires_in_seconds,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub is_authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal_id: Option<PrincipalId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub is_superuser: bool,
    pub permissions: Vec<String>,
    pub second_factor: SecondFactorStatus,
}

impl MeResponse {
    pub fn new(caller: Option<&Caller>, second_factor: SecondFactorStatus) -> Self {
        let Some(caller) = caller else {
            return Self {
                is_authenticated: false,
                principal_id: None,
                username: None,
                role: None,
                is_superuser: false,
                permissions: Vec::new(),
                second_factor,
            };
        };

        let p = &caller.principal;
        Self {
            is_authenticated: true,
            principal_id: Some(p.id),
            username: Some(p.username.clone()),
            role: p.role,
            is_superuser: p.is_superuser,
            permissions: p.explicit_permissions.iter().map(|g| g.as_str().to_string()).collect(),
            second_factor,
        }
    }
}
