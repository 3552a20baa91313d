//! Test module for mklauncher-core
//!
//! Supervisor tests spawn real processes (`echo`, `sleep`, `cat`, `/bin/sh`)
//! and poll until the expected state is reached.

pub(crate) mod fixtures;
mod supervisor_tests;
