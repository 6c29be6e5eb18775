use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub api_base_url: Option<String>,
}

static API_BASE_URL: OnceLock<String> = OnceLock::new();

/// Host fallback, matching the backend's default listen address.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8100";

pub fn normalize_base_url(value: &str) -> String {
    value.trim().trim_end_matches('/').to_string()
}

fn cache_base_url(value: &str) -> String {
    let value = normalize_base_url(value);
    let _ = API_BASE_URL.set(value.clone());
    API_BASE_URL.get().cloned().unwrap_or(value)
}

#[cfg(target_arch = "wasm32")]
mod browser {
    use super::RuntimeConfig;
    use anyhow::{bail, Context};

    fn read_global(global: &str, keys: [&str; 2]) -> Option<String> {
        let w = web_sys::window()?;
        let any = js_sys::Reflect::get(&w, &global.into()).ok()?;
        if any.is_undefined() || any.is_null() {
            return None;
        }
        let obj = js_sys::Object::from(any);
        keys.iter()
            .filter_map(|key| js_sys::Reflect::get(&obj, &(*key).into()).ok())
            .find(|v| !v.is_undefined() && !v.is_null())
            .and_then(|v| v.as_string())
    }

    pub fn snapshot_from_globals() -> Option<String> {
        // window.__HR_PORTAL_ENV (env.js) wins over window.__HR_PORTAL_CONFIG
        read_global("__HR_PORTAL_ENV", ["API_BASE_URL", "api_base_url"])
            .or_else(|| read_global("__HR_PORTAL_CONFIG", ["api_base_url", "API_BASE_URL"]))
    }

    pub fn write_window_config(cfg: &RuntimeConfig) {
        let (Some(url), Some(w)) = (&cfg.api_base_url, web_sys::window()) else {
            return;
        };
        let obj = js_sys::Object::new();
        let _ = js_sys::Reflect::set(
            &obj,
            &"api_base_url".into(),
            &wasm_bindgen::JsValue::from_str(url),
        );
        let _ = js_sys::Reflect::set(&w, &"__HR_PORTAL_CONFIG".into(), &obj);
    }

    pub async fn fetch_runtime_config() -> anyhow::Result<RuntimeConfig> {
        let url = format!("{}/config.json", page_origin().context("no page origin")?);
        let resp = reqwest::get(&url).await.context("config.json request failed")?;
        if !resp.status().is_success() {
            bail!("config.json returned {}", resp.status());
        }
        resp.json::<RuntimeConfig>()
            .await
            .context("config.json is not valid")
    }

    pub fn page_origin() -> Option<String> {
        web_sys::window()?.location().origin().ok()
    }
}

#[cfg(target_arch = "wasm32")]
pub async fn await_api_base_url() -> String {
    if let Some(cached) = API_BASE_URL.get() {
        return cached.clone();
    }
    if let Some(existing) = browser::snapshot_from_globals() {
        return cache_base_url(&existing);
    }
    match browser::fetch_runtime_config().await {
        Ok(cfg) => {
            browser::write_window_config(&cfg);
            if let Some(url) = cfg.api_base_url {
                return cache_base_url(&url);
            }
        }
        Err(err) => log::debug!("runtime config unavailable: {:#}", err),
    }
    let origin = browser::page_origin().unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
    cache_base_url(&origin)
}

#[cfg(not(target_arch = "wasm32"))]
pub async fn await_api_base_url() -> String {
    if let Some(cached) = API_BASE_URL.get() {
        return cached.clone();
    }
    let from_env = std::env::var("HR_PORTAL_API_BASE_URL").ok();
    cache_base_url(from_env.as_deref().unwrap_or(DEFAULT_API_BASE_URL))
}

pub async fn init() {
    let base = await_api_base_url().await;
    log::info!("API base URL: {}", base);
}
