//! Helpers shared by unit tests that touch process environment.

use std::sync::{Mutex, MutexGuard};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Serialize tests that read or write environment variables.
pub fn lock_env() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Remove every variable the config resolver reads. Caller holds [`lock_env`].
pub fn clear_parley_env() {
    for (_, names) in crate::config::CREDENTIAL_ENV {
        for name in names {
            unsafe { std::env::remove_var(name) };
        }
    }
    for name in [
        "PARLEY_ROUNDS",
        "PARLEY_MODE",
        "PARLEY_AGENT_A",
        "PARLEY_AGENT_B",
        "PARLEY_CRITIC",
        "PARLEY_ARBITER",
        "PARLEY_PROFILE_DIR",
        "PARLEY_OUTPUT_DIR",
        "PARLEY_DATABASE_URL",
        "PARLEY_TIMEOUT_SECS",
    ] {
        unsafe { std::env::remove_var(name) };
    }
}
