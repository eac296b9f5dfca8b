use tokio::sync::{Mutex, MutexGuard};

static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Serializes tests that touch process environment variables. The listed
/// keys are cleared when the guard is taken and again when it drops.
pub struct ScopedEnv {
    _lock: MutexGuard<'static, ()>,
    keys: &'static [&'static str],
}

impl ScopedEnv {
    pub fn acquire(keys: &'static [&'static str]) -> Self {
        let lock = ENV_LOCK.blocking_lock();
        clear(keys);
        Self { _lock: lock, keys }
    }

    pub fn set(&self, key: &str, value: &str) {
        std::env::set_var(key, value);
    }

    pub fn remove(&self, key: &str) {
        std::env::remove_var(key);
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        clear(self.keys);
    }
}

fn clear(keys: &[&str]) {
    for key in keys {
        std::env::remove_var(key);
    }
}
