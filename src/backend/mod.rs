//! Lens code generation
//!
//! Everything that turns parsed tests into PHP source:
//!
//! 1. Type surface of each scripted type → [`mock::build`] → mock class source
//! 2. Case + mocks + fixtures → [`harness::assemble`] → `harness.php` / `subject.php`
//!
//! ## Module Organization
//!
//! - `writer.rs` - Low-level PHP source builder with indentation tracking
//! - `fragments.rs` - Validated class/method/parameter builders
//! - `surface.rs` - Type surfaces and the providers that look them up
//! - `mock.rs` - Record/replay mock class generation
//! - `agent.rs` - Call-log coordinator (record/replay protocol)
//! - `harness.rs` - Harness and subject file assembly
//! - `runtime.php` - The PHP side of the agent, embedded in every harness

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod agent;
pub mod fragments;
pub mod harness;
pub mod mock;
pub mod surface;
pub mod writer;

pub use agent::{Agent, AgentError, CallDescriptor, Identity, Placeholder, ProtocolViolation, Strictness};
pub use harness::{HarnessFiles, HarnessPlan, SENTINEL};
pub use mock::{MockError, MockMode, MockSource, build, build_for, mock_class_name};
pub use surface::{ReflectionProvider, SurfaceCache, SurfaceError, SurfaceProvider, TypeKind, TypeSurface};
