//! Browser concurrency pool for headless Chrome instances.
//!
//! Each Chrome process holds a substantial amount of memory, and a batch
//! run fetches pages for many domains concurrently. This module caps the
//! number of live browser instances; the rendering engine is treated as a
//! blocking resource pool, with one permit held per fetch.
//!
//! Uses std::sync primitives so it works inside spawn_blocking closures.

/// Maximum concurrent headless Chrome instances.
const MAX_BROWSER_INSTANCES: usize = 4;

/// Global counting semaphore for browser instances.
static BROWSER_SEMAPHORE: once_cell::sync::Lazy<BrowserSemaphore> =
    once_cell::sync::Lazy::new(|| BrowserSemaphore::new(MAX_BROWSER_INSTANCES));

/// A counting semaphore over std::sync primitives. Unlike
/// tokio::sync::Semaphore this can block inside synchronous contexts.
struct BrowserSemaphore {
    state: std::sync::Mutex<usize>,
    condvar: std::sync::Condvar,
    max: usize,
}

impl BrowserSemaphore {
    fn new(max: usize) -> Self {
        Self {
            state: std::sync::Mutex::new(0),
            condvar: std::sync::Condvar::new(),
            max,
        }
    }

    fn acquire(&self) -> BrowserPermit<'_> {
        let mut count = self.state.lock().unwrap();
        while *count >= self.max {
            count = self.condvar.wait(count).unwrap();
        }
        *count += 1;
        BrowserPermit { semaphore: self }
    }

    fn release(&self) {
        let mut count = self.state.lock().unwrap();
        *count -= 1;
        self.condvar.notify_one();
    }
}

/// RAII guard that releases a semaphore permit on drop.
struct BrowserPermit<'a> {
    semaphore: &'a BrowserSemaphore,
}

impl<'a> Drop for BrowserPermit<'a> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

/// A Chrome instance with an attached pool permit. Dropping the guard
/// kills the Chrome process and frees the permit.
pub struct BrowserGuard {
    pub browser: headless_chrome::Browser,
    _permit: BrowserPermit<'static>,
}

/// Launch a headless Chrome instance, gated by the global pool. Blocks
/// until a permit is free. The sandbox is disabled automatically when
/// running inside a container (detected via /.dockerenv or the
/// CONTACTFINDER_CONTAINER env var).
pub fn create_browser() -> anyhow::Result<BrowserGuard> {
    let permit = BROWSER_SEMAPHORE.acquire();

    let is_container = std::env::var("CONTACTFINDER_CONTAINER").is_ok()
        || std::path::Path::new("/.dockerenv").exists();

    let chrome_path: Option<std::path::PathBuf> =
        std::env::var("CHROME_PATH").ok().map(std::path::PathBuf::from);

    // Distinct debug port per instance so parallel launches don't collide.
    static PORT_COUNTER: std::sync::atomic::AtomicU16 = std::sync::atomic::AtomicU16::new(9222);
    let debug_port = PORT_COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    if debug_port > 9322 {
        PORT_COUNTER.store(9222, std::sync::atomic::Ordering::Relaxed);
    }

    let mut builder = headless_chrome::LaunchOptions::default_builder();
    builder.port(Some(debug_port));
    if is_container {
        builder.sandbox(false);
    }
    if let Some(path) = &chrome_path {
        builder.path(Some(path.clone()));
    }
    let options = builder
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build Chrome launch options: {}", e))?;

    let browser = headless_chrome::Browser::new(options)
        .map_err(|e| anyhow::anyhow!("Failed to launch headless Chrome: {}", e))?;

    Ok(BrowserGuard {
        browser,
        _permit: permit,
    })
}
