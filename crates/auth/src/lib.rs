//! `astrocat-auth`: authorization core for the space catalog.
//!
//! Roles, grants and ownership predicates, the per-action requirement table,
//! TOTP step-up and the time-boxed second-factor session window. Decoupled
//! from HTTP; storage is reached through the `PrincipalDirectory` and
//! `SessionStore` traits.

pub mod authorize;
pub mod claims;
pub mod clock;
pub mod config;
pub mod directory;
pub mod evaluator;
pub mod permissions;
pub mod principal;
pub mod requirements;
pub mod roles;
pub mod second_factor;
pub mod step_up;
pub mod totp;

pub use authorize::{AuthorizationExplanation, AuthorizationGate, AuthzError, DenialKind, DenialReason, PrincipalState};
pub use claims::{Hs256JwtValidator, JwtClaims, JwtValidator, TokenValidationError, validate_claims};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StepUpConfig;
pub use directory::{DirectoryError, InMemoryDirectory, PrincipalDirectory};
pub use evaluator::{OwnedRecord, PredicateCheck, RecordScope, ResourceContext};
pub use permissions::{Permission, grants};
pub use principal::{Caller, Principal};
pub use requirements::{Action, ActionRequirement, ActionRequirements, Predicate, ResourceKind, RuleDefinition};
pub use roles::Role;
pub use second_factor::{
    InMemorySessionStore, SecondFactorSession, SecondFactorSessions, SecondFactorState, SessionStore,
    SessionStoreError,
};
pub use step_up::{SecondFactorStatus, StepUpError, StepUpService, Verified};
pub use totp::{ProvisioningDescriptor, TotpConfig, TotpError, TotpManager, TotpSecret};

pub use astrocat_core::{PrincipalId, SessionId};
