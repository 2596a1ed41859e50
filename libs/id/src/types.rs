//! Identifier definitions.

use crate::define_id;

// =============================================================================
// People
// =============================================================================

// A GitHub login; also the free-text `description` on backend instances.
define_id!(StudentId, "student");

// =============================================================================
// Provisioned resources
// =============================================================================

// Assigned by the provisioning backend, stable across runs.
define_id!(InstanceId, "instance");

// =============================================================================
// Tests
// =============================================================================
