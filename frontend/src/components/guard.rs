use std::{cell::Cell, rc::Rc};

use leptos::*;
use leptos_router::{use_location, use_navigate, NavigateOptions};
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};

use crate::{
    api::ApiClient,
    components::layout::LoadingSpinner,
    pages::PageShell,
    router::{
        self, RouteAccessPolicy, RouteEntry, ADMIN_LANDING_PATH, LOGIN_PATH, RESUME_PARAM,
        ROOT_PATH, STAFF_AREA_PATH, STAFF_LANDING_PATH,
    },
    state::{
        session::{Session, SessionStore},
        validation::{ValidationCache, ValidationGate},
    },
    utils::storage::BrowserStorage,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationRequest {
    /// Target path without query string.
    pub path: String,
    /// Target path including query string; resumed after login.
    pub full_path: String,
    pub from: String,
    pub policy: RouteAccessPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectReason {
    /// No token stored.
    Unauthenticated,
    /// Token stored but rejected by the backend.
    SessionInvalidated,
    /// Authenticated without the privilege the route asks for.
    RoleMismatch,
    /// Signed-in user opened the login or root page.
    AlreadyAuthenticated,
    /// Root of the app sends each role to its home page.
    Landing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub target: &'static str,
    pub resume: Option<String>,
    pub reason: RedirectReason,
}

impl Redirect {
    pub fn href(&self) -> String {
        match &self.resume {
            Some(resume) => format!(
                "{}?{}={}",
                self.target,
                RESUME_PARAM,
                utf8_percent_encode(resume, NON_ALPHANUMERIC)
            ),
            None => self.target.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    Proceed,
    Redirect(Redirect),
    /// Superseded by a newer navigation; the decision must not be applied.
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationTicket(u64);

/// Hands out one ticket per navigation so a late decision can tell it has
/// been overtaken.
#[derive(Debug, Clone, Default)]
pub struct NavigationSequence {
    latest: Rc<Cell<u64>>,
}

impl NavigationSequence {
    pub fn begin(&self) -> NavigationTicket {
        let next = self.latest.get().wrapping_add(1);
        self.latest.set(next);
        NavigationTicket(next)
    }

    pub fn is_current(&self, ticket: NavigationTicket) -> bool {
        self.latest.get() == ticket.0
    }
}

pub fn landing_path(session: &Session) -> &'static str {
    if session.is_privileged() {
        ADMIN_LANDING_PATH
    } else {
        STAFF_LANDING_PATH
    }
}

/// Path the login page should forward to, read from its query string.
/// Only same-origin absolute paths are accepted.
pub fn resume_path(search: &str) -> Option<String> {
    let query = search.strip_prefix('?').unwrap_or(search);
    let raw = query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == RESUME_PARAM).then_some(value)
    })?;
    let decoded = percent_decode_str(raw).decode_utf8().ok()?.into_owned();
    is_same_origin_path(&decoded).then_some(decoded)
}

// Browsers read `/\host` like `//host`.
fn is_same_origin_path(path: &str) -> bool {
    let mut chars = path.chars();
    chars.next() == Some('/')
        && !matches!(chars.next(), Some('/' | '\\'))
        && !path.chars().any(char::is_control)
}

/// Guard request for a location, with the page it mounts once allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedNavigation {
    pub request: NavigationRequest,
    pub route: &'static RouteEntry,
}

/// Builds the guard request for `pathname` and `search`. Declared redirects
/// come first: `Err` carries the path the location must be replaced with.
pub fn plan_navigation(
    pathname: &str,
    search: &str,
    from: String,
) -> Result<PlannedNavigation, String> {
    let Some(resolved) = router::resolve(pathname) else {
        return Err(LOGIN_PATH.to_string());
    };
    if resolved.path != pathname {
        return Err(resolved.path);
    }
    let query = search.trim_start_matches('?');
    let full_path = if query.is_empty() {
        pathname.to_string()
    } else {
        format!("{}?{}", pathname, query)
    };
    Ok(PlannedNavigation {
        request: NavigationRequest {
            path: pathname.to_string(),
            full_path,
            from,
            policy: resolved.definition.access,
        },
        route: resolved.definition,
    })
}

#[derive(Clone)]
pub struct NavigationGuard {
    sessions: SessionStore,
    gate: ValidationGate,
    sequence: NavigationSequence,
}

impl NavigationGuard {
    pub fn new(sessions: SessionStore, gate: ValidationGate) -> Self {
        Self {
            sessions,
            gate,
            sequence: NavigationSequence::default(),
        }
    }

    /// Guard over `localStorage`, with a fresh validation cache.
    pub fn browser() -> Self {
        let sessions = SessionStore::new(Rc::new(BrowserStorage));
        let api = Rc::new(ApiClient::new(sessions.clone()));
        let gate = ValidationGate::new(api, sessions.clone(), ValidationCache::new());
        Self::new(sessions, gate)
    }

    pub fn begin_navigation(&self) -> NavigationTicket {
        self.sequence.begin()
    }

    pub async fn evaluate(
        &self,
        request: &NavigationRequest,
        ticket: NavigationTicket,
    ) -> NavigationOutcome {
        let session = self.sessions.read();
        let outcome = self.decide(request, &session).await;
        if !self.sequence.is_current(ticket) {
            log::debug!("navigation to {} superseded", request.full_path);
            return NavigationOutcome::Blocked;
        }
        match &outcome {
            NavigationOutcome::Redirect(redirect) => log::debug!(
                "{} -> {} redirected to {} ({:?})",
                request.from,
                request.full_path,
                redirect.target,
                redirect.reason
            ),
            _ => log::debug!("{} -> {} allowed", request.from, request.full_path),
        }
        outcome
    }

    async fn decide(&self, request: &NavigationRequest, session: &Session) -> NavigationOutcome {
        let path = request.path.as_str();

        if !request.policy.requires_auth {
            let entry_page = path == LOGIN_PATH || path == ROOT_PATH;
            if entry_page && session.is_authenticated() && self.gate.confirm_token(session).await {
                return redirect_to(landing_path(session), RedirectReason::AlreadyAuthenticated);
            }
            return NavigationOutcome::Proceed;
        }

        if !session.is_authenticated() {
            return login_redirect(request, RedirectReason::Unauthenticated);
        }
        if !self.gate.confirm_token(session).await {
            return login_redirect(request, RedirectReason::SessionInvalidated);
        }

        if request.policy.role.is_some() {
            if session.is_privileged() {
                return NavigationOutcome::Proceed;
            }
            return redirect_to(STAFF_LANDING_PATH, RedirectReason::RoleMismatch);
        }

        if router::is_within(path, STAFF_AREA_PATH) {
            return NavigationOutcome::Proceed;
        }

        if path == ROOT_PATH {
            return redirect_to(landing_path(session), RedirectReason::Landing);
        }

        NavigationOutcome::Proceed
    }
}

fn redirect_to(target: &'static str, reason: RedirectReason) -> NavigationOutcome {
    NavigationOutcome::Redirect(Redirect {
        target,
        resume: None,
        reason,
    })
}

fn login_redirect(request: &NavigationRequest, reason: RedirectReason) -> NavigationOutcome {
    NavigationOutcome::Redirect(Redirect {
        target: LOGIN_PATH,
        resume: Some(request.full_path.clone()),
        reason,
    })
}

pub fn use_navigation_guard() -> NavigationGuard {
    use_context::<NavigationGuard>().unwrap_or_else(|| {
        log::warn!("no navigation guard in context; validation state will not be shared");
        NavigationGuard::browser()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageStatus {
    Pending,
    Allowed(&'static RouteEntry),
}

fn replace_history() -> NavigateOptions {
    NavigateOptions {
        replace: true,
        ..Default::default()
    }
}

/// Resolves the current location against the route table, runs the guard,
/// and renders the page only once it may proceed.
#[component]
pub fn RoutedPage() -> impl IntoView {
    let guard = use_navigation_guard();
    let location = use_location();
    let navigate = use_navigate();
    let (status, set_status) = create_signal(PageStatus::Pending);

    create_effect(move |previous: Option<String>| {
        let pathname = location.pathname.get();
        let search = location.search.get();
        let from = previous.unwrap_or_else(|| ROOT_PATH.to_string());

        let planned = match plan_navigation(&pathname, &search, from) {
            Ok(planned) => planned,
            Err(target) => {
                navigate(&target, replace_history());
                return pathname;
            }
        };

        set_status.set(PageStatus::Pending);
        let ticket = guard.begin_navigation();
        let guard = guard.clone();
        let navigate = navigate.clone();
        spawn_local(async move {
            match guard.evaluate(&planned.request, ticket).await {
                NavigationOutcome::Proceed => set_status.set(PageStatus::Allowed(planned.route)),
                NavigationOutcome::Redirect(redirect) => {
                    navigate(&redirect.href(), replace_history())
                }
                NavigationOutcome::Blocked => {}
            }
        });
        pathname
    });

    move || match status.get() {
        PageStatus::Pending => view! { <LoadingSpinner /> }.into_view(),
        PageStatus::Allowed(route) => view! { <PageShell route=route /> }.into_view(),
    }
}


#[cfg(all(test, not(target_arch = "wasm32")))]
mod host_tests {
    use super::*;
    use crate::api::SESSION_PROBE_PATH;
    use crate::router::ROUTES;
    use crate::state::session::keys;
    use crate::utils::storage::{KeyValueStore, MemoryStorage};
    use httpmock::prelude::*;
    use serde_json::json;

    const OFFLINE: &str = "http://127.0.0.1:9";

    struct Harness {
        guard: NavigationGuard,
        storage: Rc<MemoryStorage>,
    }

    impl Harness {
        fn new(base_url: &str, token: Option<&str>, user: Option<&str>) -> Self {
            let storage = Rc::new(MemoryStorage::new());
            if let Some(token) = token {
                storage.set(keys::TOKEN, token).unwrap();
            }
            if let Some(user) = user {
                storage.set(keys::USER, user).unwrap();
            }
            let sessions = SessionStore::new(storage.clone());
            let api = Rc::new(ApiClient::new_with_base_url(base_url, sessions.clone()));
            let gate = ValidationGate::new(api, sessions.clone(), ValidationCache::new());
            Self {
                guard: NavigationGuard::new(sessions, gate),
                storage,
            }
        }

        fn signed_in(base_url: &str, role: &str) -> Self {
            let user = format!(r#"{{"role":"{}"}}"#, role);
            Self::new(base_url, Some("jwt-token"), Some(&user))
        }

        /// Follows declared redirects the way `RoutedPage` replaces the
        /// location, then evaluates the page it lands on.
        async fn navigate(&self, target: &str) -> NavigationOutcome {
            let (path, search) = target.split_once('?').unwrap_or((target, ""));
            let mut path = path.to_string();
            let mut search = search.to_string();
            let mut from = ROOT_PATH.to_string();
            for _ in 0..4 {
                match plan_navigation(&path, &search, from.clone()) {
                    Ok(planned) => {
                        let ticket = self.guard.begin_navigation();
                        return self.guard.evaluate(&planned.request, ticket).await;
                    }
                    Err(replacement) => {
                        from = std::mem::replace(&mut path, replacement);
                        search.clear();
                    }
                }
            }
            panic!("{} never settled on a page", target);
        }
    }

    fn request(path: &str, policy: RouteAccessPolicy) -> NavigationRequest {
        NavigationRequest {
            path: path.to_string(),
            full_path: path.to_string(),
            from: LOGIN_PATH.to_string(),
            policy,
        }
    }

    fn redirected_to(outcome: &NavigationOutcome) -> Option<&'static str> {
        match outcome {
            NavigationOutcome::Redirect(redirect) => Some(redirect.target),
            _ => None,
        }
    }

    async fn probe_ok(server: &MockServer) -> httpmock::Mock<'_> {
        server
            .mock_async(|when, then| {
                when.method(GET).path(SESSION_PROBE_PATH);
                then.status(200).json_body(json!(null));
            })
            .await
    }

    #[tokio::test]
    async fn public_routes_proceed_without_token() {
        let harness = Harness::new(OFFLINE, None, None);
        for route in ROUTES
            .iter()
            .filter(|route| route.redirect.is_none() && !route.access.requires_auth)
        {
            let outcome = harness.navigate(route.path).await;
            assert_eq!(outcome, NavigationOutcome::Proceed, "{}", route.path);
        }
    }

    #[tokio::test]
    async fn protected_routes_without_token_redirect_to_login_with_resume() {
        let harness = Harness::new(OFFLINE, None, Some(r#"{"role":"god"}"#));
        for path in ["/admin", "/users/7/edit", "/staff/leave", "/oauth/callback"] {
            match harness.navigate(path).await {
                NavigationOutcome::Redirect(redirect) => {
                    assert_eq!(redirect.target, LOGIN_PATH);
                    assert_eq!(redirect.resume.as_deref(), Some(path));
                    assert_eq!(redirect.reason, RedirectReason::Unauthenticated);
                }
                other => panic!("{} gave {:?}", path, other),
            }
        }
    }

    #[tokio::test]
    async fn resume_keeps_query_string() {
        let harness = Harness::new(OFFLINE, None, None);
        let outcome = harness.navigate("/reports?month=3").await;
        let NavigationOutcome::Redirect(redirect) = outcome else {
            panic!("expected redirect");
        };
        assert_eq!(redirect.href(), "/login?redirect=%2Freports%3Fmonth%3D3");
    }

    #[tokio::test]
    async fn admin_role_proceeds_on_admin_route() {
        let server = MockServer::start_async().await;
        probe_ok(&server).await;
        for role in ["god", "gm"] {
            let harness = Harness::signed_in(&server.base_url(), role);
            assert_eq!(harness.navigate("/reports").await, NavigationOutcome::Proceed);
        }
    }

    #[tokio::test]
    async fn staff_role_on_admin_route_lands_on_staff_home() {
        let server = MockServer::start_async().await;
        probe_ok(&server).await;
        let harness = Harness::signed_in(&server.base_url(), "player");
        match harness.navigate("/users").await {
            NavigationOutcome::Redirect(redirect) => {
                assert_eq!(redirect.target, STAFF_LANDING_PATH);
                assert_eq!(redirect.reason, RedirectReason::RoleMismatch);
                assert!(redirect.resume.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn malformed_user_is_treated_as_least_privileged() {
        let server = MockServer::start_async().await;
        probe_ok(&server).await;
        let harness = Harness::new(&server.base_url(), Some("jwt-token"), Some("{broken"));
        assert_eq!(
            redirected_to(&harness.navigate("/admin").await),
            Some(STAFF_LANDING_PATH)
        );
        assert_eq!(
            harness.navigate("/staff/profile").await,
            NavigationOutcome::Proceed
        );
    }

    #[tokio::test]
    async fn any_authenticated_role_enters_staff_area() {
        let server = MockServer::start_async().await;
        probe_ok(&server).await;
        for role in ["god", "gm", "player"] {
            let harness = Harness::signed_in(&server.base_url(), role);
            assert_eq!(
                harness.navigate("/staff/arena/3").await,
                NavigationOutcome::Proceed
            );
        }
    }

    #[tokio::test]
    async fn guard_probes_once_across_navigations() {
        let server = MockServer::start_async().await;
        let probe = probe_ok(&server).await;
        let harness = Harness::signed_in(&server.base_url(), "gm");

        harness.navigate("/admin").await;
        harness.navigate("/rewards").await;
        harness.navigate("/staff/home").await;

        probe.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn rejected_token_clears_session_and_redirects_to_login() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(SESSION_PROBE_PATH);
                then.status(401)
                    .json_body(json!({ "detail": "Could not validate credentials" }));
            })
            .await;
        let harness = Harness::signed_in(&server.base_url(), "gm");

        match harness.navigate("/admin").await {
            NavigationOutcome::Redirect(redirect) => {
                assert_eq!(redirect.target, LOGIN_PATH);
                assert_eq!(redirect.resume.as_deref(), Some("/admin"));
                assert_eq!(redirect.reason, RedirectReason::SessionInvalidated);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(harness.storage.is_empty());
        assert!(harness.guard.sessions.read().token.is_none());
    }

    #[tokio::test]
    async fn rejected_token_on_login_page_stays_on_login() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(SESSION_PROBE_PATH);
                then.status(401).json_body(json!({ "detail": "expired" }));
            })
            .await;
        let harness = Harness::signed_in(&server.base_url(), "player");

        assert_eq!(harness.navigate("/login").await, NavigationOutcome::Proceed);
        assert!(harness.storage.is_empty());
    }

    #[tokio::test]
    async fn unreachable_backend_keeps_admin_signed_in() {
        let harness = Harness::signed_in(OFFLINE, "god");
        assert_eq!(
            redirected_to(&harness.navigate("/").await),
            Some(ADMIN_LANDING_PATH)
        );
        assert_eq!(harness.navigate("/admin").await, NavigationOutcome::Proceed);
        assert_eq!(harness.storage.len(), 2);
    }

    #[tokio::test]
    async fn root_sends_each_role_to_its_landing_page() {
        let server = MockServer::start_async().await;
        probe_ok(&server).await;

        let staff = Harness::signed_in(&server.base_url(), "player");
        assert_eq!(
            redirected_to(&staff.navigate("/").await),
            Some(STAFF_LANDING_PATH)
        );
        let admin = Harness::signed_in(&server.base_url(), "gm");
        match admin.navigate("/").await {
            NavigationOutcome::Redirect(redirect) => {
                assert_eq!(redirect.target, ADMIN_LANDING_PATH);
                assert_eq!(redirect.reason, RedirectReason::AlreadyAuthenticated);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn protected_root_sends_each_role_to_its_landing_page() {
        let server = MockServer::start_async().await;
        probe_ok(&server).await;
        let policy = RouteAccessPolicy::AUTHENTICATED;

        let staff = Harness::signed_in(&server.base_url(), "player");
        let ticket = staff.guard.begin_navigation();
        let outcome = staff.guard.evaluate(&request(ROOT_PATH, policy), ticket).await;
        assert_eq!(redirected_to(&outcome), Some(STAFF_LANDING_PATH));

        let admin = Harness::signed_in(&server.base_url(), "god");
        let ticket = admin.guard.begin_navigation();
        match admin.guard.evaluate(&request(ROOT_PATH, policy), ticket).await {
            NavigationOutcome::Redirect(redirect) => {
                assert_eq!(redirect.target, ADMIN_LANDING_PATH);
                assert_eq!(redirect.reason, RedirectReason::Landing);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn authenticated_page_outside_staff_area_proceeds() {
        let server = MockServer::start_async().await;
        probe_ok(&server).await;
        let harness = Harness::signed_in(&server.base_url(), "player");
        assert_eq!(
            harness.navigate("/oauth/callback").await,
            NavigationOutcome::Proceed
        );
    }

    #[test]
    fn pages_share_the_provided_guard() {
        let runtime = create_runtime();
        let harness = Harness::new(OFFLINE, None, None);
        provide_context(harness.guard.clone());

        let ticket = use_navigation_guard().begin_navigation();
        assert!(harness.guard.sequence.is_current(ticket));
        runtime.dispose();
    }

    #[tokio::test]
    async fn superseded_evaluation_is_blocked() {
        let server = MockServer::start_async().await;
        probe_ok(&server).await;
        let harness = Harness::signed_in(&server.base_url(), "gm");

        let stale = harness.guard.begin_navigation();
        let newer = harness.guard.begin_navigation();
        let admin = request("/admin", RouteAccessPolicy::role(crate::state::session::Role::Gm));

        assert_eq!(
            harness.guard.evaluate(&admin, stale).await,
            NavigationOutcome::Blocked
        );
        assert_eq!(
            harness.guard.evaluate(&admin, newer).await,
            NavigationOutcome::Proceed
        );
    }
}
