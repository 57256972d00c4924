//! Wait for a database, optionally run migrations, then become the application.
//!
//! A [`launch::Launcher`] runs three phases in order: poll a [`probe::ReadinessProbe`] until the
//! dependency is ready, run a [`prepare::Preparer`] unless preparation is skipped, and finally
//! hand the process over to the target command through a [`handoff::Handoff`].
pub mod config;
pub mod endpoint;
pub mod error;
pub mod handoff;
pub mod launch;
pub mod poll;
pub mod prepare;
pub mod probe;
