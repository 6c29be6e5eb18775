use leptos::*;
use leptos_meta::provide_meta_context;

/// Renders a view on the host inside a throwaway reactive runtime with a
/// meta context already provided.
pub fn render_to_string<F, N>(view: F) -> String
where
    F: FnOnce() -> N + 'static,
    N: IntoView + 'static,
{
    leptos_reactive::suppress_resource_load(true);
    let runtime = create_runtime();
    provide_meta_context();
    let html = view().into_view().render_to_string().to_string();
    runtime.dispose();
    leptos_reactive::suppress_resource_load(false);
    html
}
