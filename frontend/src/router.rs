use leptos::*;
use leptos_meta::provide_meta_context;
use leptos_router::*;

use crate::{
    components::guard::{NavigationGuard, RoutedPage},
    state::session::Role,
};

pub const ROOT_PATH: &str = "/";
pub const LOGIN_PATH: &str = "/login";
pub const ADMIN_LANDING_PATH: &str = "/admin";
pub const STAFF_LANDING_PATH: &str = "/staff/home";
pub const STAFF_AREA_PATH: &str = "/staff";

/// Query parameter carrying the path to resume after login.
pub const RESUME_PARAM: &str = "redirect";

const MAX_REDIRECT_HOPS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteAccessPolicy {
    pub requires_auth: bool,
    pub role: Option<Role>,
}

impl RouteAccessPolicy {
    pub const PUBLIC: Self = Self {
        requires_auth: false,
        role: None,
    };

    pub const AUTHENTICATED: Self = Self {
        requires_auth: true,
        role: None,
    };

    pub const fn role(role: Role) -> Self {
        Self {
            requires_auth: true,
            role: Some(role),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    /// Pattern; `:name` matches one segment, `*` matches anything.
    pub path: &'static str,
    pub name: &'static str,
    pub access: RouteAccessPolicy,
    pub redirect: Option<&'static str>,
}

const fn page(path: &'static str, name: &'static str, access: RouteAccessPolicy) -> RouteEntry {
    RouteEntry {
        path,
        name,
        access,
        redirect: None,
    }
}

const fn forward(path: &'static str, to: &'static str) -> RouteEntry {
    RouteEntry {
        path,
        name: "",
        access: RouteAccessPolicy::PUBLIC,
        redirect: Some(to),
    }
}

const ADMIN: RouteAccessPolicy = RouteAccessPolicy::role(Role::Gm);
const STAFF: RouteAccessPolicy = RouteAccessPolicy::AUTHENTICATED;

/// Matched top to bottom; the catch-all must stay last.
pub const ROUTES: &[RouteEntry] = &[
    forward("/", LOGIN_PATH),
    page("/oauth/callback", "OAuthCallback", RouteAccessPolicy::AUTHENTICATED),
    page("/sso", "SSO", RouteAccessPolicy::PUBLIC),
    page("/login", "Login", RouteAccessPolicy::PUBLIC),
    page("/admin", "AdminDashboard", ADMIN),
    page("/battle-arena", "BattleArena", ADMIN),
    page("/artifact-shop", "ArtifactShop", ADMIN),
    page("/company", "Company", ADMIN),
    page("/users", "UserManagement", ADMIN),
    page("/users/create", "CreateUser", ADMIN),
    page("/users/:id/edit", "EditUser", ADMIN),
    page("/approval", "Approval", ADMIN),
    page("/approval-patterns", "ApprovalPatterns", ADMIN),
    page("/rewards", "Rewards", ADMIN),
    page("/verify-redemption", "VerifyRedemption", ADMIN),
    page("/reports", "Reports", ADMIN),
    page("/badges", "Badges", ADMIN),
    page("/badge-quests", "BadgeQuests", ADMIN),
    page("/badge-shop-admin", "BadgeShopAdmin", ADMIN),
    page("/fortune-wheel", "FortuneWheel", ADMIN),
    forward("/staff", STAFF_LANDING_PATH),
    page("/staff/home", "StaffHome", STAFF),
    page("/staff/check-in", "CheckIn", STAFF),
    page("/staff/services", "StaffServices", STAFF),
    page("/staff/leave", "LeaveRequest", STAFF),
    page("/staff/redeem", "RedeemPoints", STAFF),
    page("/staff/approvals", "StaffApprovals", STAFF),
    page("/staff/coupons", "StaffCoupons", STAFF),
    page("/staff/profile", "MyProfile", STAFF),
    page("/staff/town-people", "TownPeople", STAFF),
    page("/staff/magic-shop", "MagicShop", STAFF),
    page("/staff/fitbit", "FitbitSteps", STAFF),
    page("/staff/expense", "StaffExpenseRequest", STAFF),
    page("/staff/revival-records", "RevivalRecords", STAFF),
    page("/staff/man-of-the-month", "ManOfTheMonth", STAFF),
    page("/staff/arena/:id", "ArenaBattle", STAFF),
    page("/staff/badge-shop", "BadgeShop", STAFF),
    page("/expense-management", "ExpenseManagement", ADMIN),
    forward("*", LOGIN_PATH),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    pub path: String,
    pub definition: &'static RouteEntry,
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

fn pattern_matches(pattern: &str, path: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    let mut expected = segments(pattern);
    let mut actual = segments(path);
    loop {
        match (expected.next(), actual.next()) {
            (None, None) => return true,
            (Some(want), Some(got)) if want.starts_with(':') || want == got => continue,
            _ => return false,
        }
    }
}

pub fn match_route(path: &str) -> Option<&'static RouteEntry> {
    ROUTES
        .iter()
        .find(|route| pattern_matches(route.path, path))
}

/// Follows declared redirects and returns the page a path lands on.
pub fn resolve(path: &str) -> Option<ResolvedRoute> {
    let mut current = path.to_string();
    for _ in 0..=MAX_REDIRECT_HOPS {
        let definition = match_route(&current)?;
        match definition.redirect {
            Some(target) => current = target.to_string(),
            None => {
                return Some(ResolvedRoute {
                    path: current,
                    definition,
                })
            }
        }
    }
    log::warn!("redirect loop while resolving {}", path);
    None
}

/// True when `path` is `area` itself or nested below it.
pub fn is_within(path: &str, area: &str) -> bool {
    path == area
        || path
            .strip_prefix(area)
            .is_some_and(|rest| rest.starts_with('/'))
}

pub fn mount_app() {
    mount_to_body(app_root);
}

pub fn app_root() -> impl IntoView {
    let guard = NavigationGuard::browser();
    provide_context(guard);
    provide_meta_context();
    view! {
        <Router>
            <Routes>
                <Route path="/" view=RoutedPage/>
                <Route path="/*any" view=RoutedPage/>
            </Routes>
        </Router>
    }
}
