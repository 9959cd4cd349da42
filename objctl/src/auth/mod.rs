//! Authentication and authorization.
//!
//! [`middleware::authenticate`] resolves the caller's credentials into an
//! immutable [`identity::Identity`] attached to the request.
//! [`authorization::current_object`] loads the object addressed by the
//! request path, and [`authorization::check_permission`] gates handlers on
//! the caller's permissions for that object.

pub mod authorization;
pub mod identity;
pub mod middleware;
pub mod verifier;
