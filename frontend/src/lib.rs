pub mod api;
pub mod components;
pub mod config;
mod pages;
pub mod router;
pub mod state;
pub mod utils;

#[cfg(test)]
mod test_support;

/// Browser entry point: logging, runtime config, then the router.
pub fn start() {
    console_error_panic_hook::set_once();
    if console_log::init_with_level(log::Level::Debug).is_err() {
        web_sys::console::warn_1(&"logger already initialized".into());
    }
    let perf = web_sys::window().and_then(|w| w.performance());
    let t0 = perf.as_ref().map(|p| p.now());
    log::info!("Starting HR portal frontend: initializing runtime config");

    wasm_bindgen_futures::spawn_local(async move {
        config::init().await;
        if let (Some(p), Some(start)) = (perf.as_ref(), t0) {
            log::info!("Runtime config initialized ({} ms)", p.now() - start);
        }
        router::mount_app();
    });
}
