use leptos::*;
use leptos_meta::Title;

use crate::router::RouteEntry;

/// Mount point for the page a route renders once the guard lets it through.
#[component]
pub fn PageShell(route: &'static RouteEntry) -> impl IntoView {
    view! {
        <Title text=route.name />
        <main class="min-h-screen bg-surface" data-route=route.name>
            <h1 class="sr-only">{route.name}</h1>
        </main>
    }
}
