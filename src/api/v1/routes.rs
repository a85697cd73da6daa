/*
 * Responsibility
 * - v1 の URL 構造を定義
 * - ルートごとの RoutePolicy（公開/認証/ロール/パーミッション）をここで宣言する
 * - 認可の判定自体は middleware::auth::access が行う
 */
use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};

use crate::api::v1::handlers::{auth, health, queue, users, workspaces};
use crate::middleware::auth::access::{self, RoutePolicy};
use crate::services::auth::rbac::{Permission, Role};
use crate::state::AppState;

const STAFF: RoutePolicy = RoutePolicy::roles(&[Role::Manager, Role::Admin]);
const ADMIN: RoutePolicy = RoutePolicy::roles(&[Role::Admin]);

const USER_CREATE: RoutePolicy = ADMIN.permissions(&[Permission::UserCreate]);
const USER_DELETE: RoutePolicy = ADMIN.permissions(&[Permission::UserDelete]);
const QUEUE_MANAGE: RoutePolicy = STAFF.permissions(&[Permission::QueueManage]);

pub fn routes(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/health", get(health::health))
        .route("/auth/login", post(auth::login))
        .route("/auth/signup", post(auth::signup))
        .route("/auth/exchange-code", post(auth::exchange_code))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/openid-configuration", get(auth::openid_configuration))
        .route("/queue", get(queue::overview))
        .route_layer(middleware::from_fn(access::guard(
            state.clone(),
            RoutePolicy::PUBLIC,
        )));

    let authenticated = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/profile", get(auth::profile))
        .route("/auth/userinfo", get(auth::userinfo))
        .route("/auth/introspect", post(auth::introspect))
        .route("/users/me", get(users::me))
        .route(
            "/users/{user_id}",
            get(users::get_user).put(users::update_user),
        )
        .route("/queue/join", post(queue::join))
        .route_layer(middleware::from_fn(access::guard(
            state.clone(),
            RoutePolicy::AUTHENTICATED,
        )));

    let staff = Router::new()
        .route("/users", get(users::list_users))
        .route("/workspaces", get(workspaces::list_workspaces))
        .route("/queue/all", get(queue::list_all))
        .route("/queue/{queue_id}", put(queue::update_queue))
        .route_layer(middleware::from_fn(access::guard(state.clone(), STAFF)));

    let admin = Router::new()
        .route("/workspaces", post(workspaces::create_workspace))
        .route("/queue/{queue_id}", delete(queue::delete_queue))
        .route_layer(middleware::from_fn(access::guard(state.clone(), ADMIN)));

    let user_admin = Router::new()
        .route("/users", post(users::create_user))
        .route_layer(middleware::from_fn(access::guard(
            state.clone(),
            USER_CREATE,
        )))
        .merge(
            Router::new()
                .route("/users/{user_id}", delete(users::delete_user))
                .route_layer(middleware::from_fn(access::guard(
                    state.clone(),
                    USER_DELETE,
                ))),
        );

    let queue_manage = Router::new()
        .route("/queue/{queue_id}/manage", post(queue::manage_queue))
        .route_layer(middleware::from_fn(access::guard(state, QUEUE_MANAGE)));

    public
        .merge(authenticated)
        .merge(staff)
        .merge(admin)
        .merge(user_admin)
        .merge(queue_manage)
}
