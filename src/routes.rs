use std::convert::Infallible;
use std::sync::Arc;

use log::error;
use serde::{Deserialize, Serialize};
use warp::http::{header, StatusCode, Uri};
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::cookies::{self, ACCESS_COOKIE};
use crate::guard::Level;
use crate::guidepost::{self, AdminOutcome, GuidePost, LoginError, RegisterError};
use crate::user::{Role, User, UserId};
use crate::views;

const FORM_LIMIT: u64 = 16 * 1024;

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    reg_username: String,
    #[serde(default)]
    reg_email: String,
    reg_password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Notice {
    success: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct Me<'a> {
    logged_in: bool,
    #[serde(flatten)]
    user: Option<PublicUser<'a>>,
}

#[derive(Debug, Serialize)]
struct PublicUser<'a> {
    id: UserId,
    username: &'a str,
    email: Option<&'a str>,
    role: Role,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    store: &'static str,
}

pub fn routes(
    guide: Arc<GuidePost>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let login_page = warp::path!("login")
        .and(warp::get())
        .map(|| warp::reply::html(views::login(None, None)));

    let post_login = warp::path!("login")
        .and(warp::post())
        .and(form::<LoginForm>())
        .and(with_guide(&guide))
        .then(login);

    let post_register = warp::path!("register")
        .and(warp::post())
        .and(form::<RegisterForm>())
        .and(with_guide(&guide))
        .then(register);

    let logout = warp::path!("logout")
        .and(warp::get())
        .and(with_guide(&guide))
        .map(|guide: Arc<GuidePost>| {
            let cookie = cookies::cleared_cookie(guide.session().secure);
            see_other(guidepost::GENERAL_LANDING, Some(cookie))
        });

    let get_me = warp::path!("api" / "user" / "me")
        .and(warp::get())
        .and(access_cookie())
        .and(with_guide(&guide))
        .then(me);

    let landing = warp::path::end()
        .and(warp::get())
        .and(access_cookie())
        .and(with_guide(&guide))
        .then(|cookie: Option<String>, guide: Arc<GuidePost>| async move {
            let user = guide.resolve(cookie.as_deref()).await;
            warp::reply::html(views::landing(user.as_ref()))
        });

    let account = warp::path!("account")
        .and(warp::get())
        .and(authed(&guide, Level::Authenticated))
        .map(|_guide: Arc<GuidePost>, user: User| warp::reply::html(views::account(&user)));

    let get_health = warp::path!("health")
        .and(warp::get())
        .and(with_guide(&guide))
        .then(health);

    let admin = {
        let dashboard = warp::path!("admin" / "dashboard")
            .and(warp::get())
            .and(authed(&guide, Level::Admin))
            .and_then(dashboard);

        let list_users = warp::path!("admin" / "users")
            .and(warp::get())
            .and(authed(&guide, Level::Admin))
            .and(warp::query::<Notice>())
            .and_then(users);

        let toggle = warp::path!("admin" / "users" / "toggle" / UserId)
            .and(warp::post())
            .and(authed(&guide, Level::Admin))
            .and_then(toggle_role);

        let delete = warp::path!("admin" / "users" / "delete" / UserId)
            .and(warp::post())
            .and(authed(&guide, Level::Admin))
            .and_then(delete_user);

        dashboard.or(list_users).or(toggle).or(delete)
    };

    login_page
        .or(post_login)
        .or(post_register)
        .or(logout)
        .or(get_me)
        .or(landing)
        .or(account)
        .or(get_health)
        .or(admin)
        .recover(recover)
        .with(warp::log("guidepost"))
}

fn with_guide(
    guide: &Arc<GuidePost>,
) -> impl Filter<Extract = (Arc<GuidePost>,), Error = Infallible> + Clone {
    let guide = Arc::clone(guide);
    warp::any().map(move || Arc::clone(&guide))
}

fn access_cookie() -> impl Filter<Extract = (Option<String>,), Error = Infallible> + Clone {
    warp::cookie::optional(ACCESS_COOKIE)
}

fn form<T>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: serde::de::DeserializeOwned + Send,
{
    warp::body::content_length_limit(FORM_LIMIT).and(warp::body::form())
}

/// Gate a route on the caller's access level, yielding the service and the
/// (freshly loaded) user.
fn authed(
    guide: &Arc<GuidePost>,
    level: Level,
) -> impl Filter<Extract = (Arc<GuidePost>, User), Error = Rejection> + Clone {
    access_cookie()
        .and(with_guide(guide))
        .and_then(move |cookie: Option<String>, guide: Arc<GuidePost>| async move {
            match guide.require(level, cookie.as_deref()).await {
                Ok(user) => Ok((guide, user)),
                Err(e) => Err(warp::reject::custom(e)),
            }
        })
        .untuple_one()
}

fn see_other(location: &'static str, cookie: Option<cookie::Cookie<'static>>) -> Response {
    let redirect = warp::redirect::see_other(Uri::from_static(location));

    match cookie {
        Some(cookie) => {
            warp::reply::with_header(redirect, header::SET_COOKIE, cookie.to_string())
                .into_response()
        }
        None => redirect.into_response(),
    }
}

async fn login(form: LoginForm, guide: Arc<GuidePost>) -> Response {
    match guide.login(&form.username, &form.password).await {
        Ok(session) => {
            let config = guide.session();
            let cookie = cookies::access_cookie(&session.token, config.ttl, config.secure);
            see_other(session.landing(), Some(cookie))
        }
        Err(LoginError::CredentialInvalid) => {
            warp::reply::html(views::login(Some(views::INVALID_CREDENTIALS), None)).into_response()
        }
        Err(LoginError::Internal) => {
            warp::reply::html(views::login(Some(views::AUTH_FAILED), None)).into_response()
        }
    }
}

async fn register(form: RegisterForm, guide: Arc<GuidePost>) -> Response {
    let RegisterForm {
        reg_username,
        reg_email,
        reg_password,
    } = form;

    let page = match guide.register(&reg_username, &reg_email, &reg_password).await {
        Ok(_) => views::login(None, Some(views::REGISTERED)),
        Err(e @ RegisterError::Internal) => {
            error!("registration of {reg_username} failed");
            views::login(Some(&e.to_string()), None)
        }
        Err(e) => views::login(Some(&e.to_string()), None),
    };

    warp::reply::html(page).into_response()
}

async fn me(cookie: Option<String>, guide: Arc<GuidePost>) -> Response {
    let user = guide.resolve(cookie.as_deref()).await;

    let me = Me {
        logged_in: user.is_some(),
        user: user.as_ref().map(|user| PublicUser {
            id: user.id,
            username: &user.username,
            email: user.email.as_deref(),
            role: user.role,
        }),
    };

    warp::reply::json(&me).into_response()
}

async fn health(guide: Arc<GuidePost>) -> Response {
    let store = if guide.store_healthy().await {
        "connected"
    } else {
        "disconnected"
    };

    warp::reply::json(&Health {
        status: "healthy",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        store,
    })
    .into_response()
}

async fn dashboard(guide: Arc<GuidePost>, admin: User) -> Result<Response, Rejection> {
    let count = guide.users().await.map_err(warp::reject::custom)?.len();

    Ok(warp::reply::html(views::dashboard(&admin, count)).into_response())
}

async fn users(guide: Arc<GuidePost>, admin: User, notice: Notice) -> Result<Response, Rejection> {
    let users = guide.users().await.map_err(warp::reject::custom)?;

    Ok(warp::reply::html(views::users(
        &admin,
        &users,
        notice.success.as_deref(),
        notice.error.as_deref(),
    ))
    .into_response())
}

async fn toggle_role(
    target: UserId,
    guide: Arc<GuidePost>,
    admin: User,
) -> Result<Response, Rejection> {
    let outcome = guide
        .toggle_role(&admin, target)
        .await
        .map_err(warp::reject::custom)?;

    let location = match outcome {
        AdminOutcome::Done => "/admin/users?success=role_updated",
        AdminOutcome::RefusedSelf => "/admin/users?error=cannot_modify_self",
        AdminOutcome::NotFound => "/admin/users?error=not_found",
    };

    Ok(see_other(location, None))
}

async fn delete_user(
    target: UserId,
    guide: Arc<GuidePost>,
    admin: User,
) -> Result<Response, Rejection> {
    let outcome = guide
        .delete_user(&admin, target)
        .await
        .map_err(warp::reject::custom)?;

    let location = match outcome {
        AdminOutcome::Done => "/admin/users?success=deleted",
        AdminOutcome::RefusedSelf => "/admin/users?error=cannot_delete_self",
        AdminOutcome::NotFound => "/admin/users?error=not_found",
    };

    Ok(see_other(location, None))
}

/// Our own errors become a bare status; diagnostic detail stays in the log.
async fn recover(err: Rejection) -> Result<Response, Rejection> {
    if let Some(e) = err.find::<guidepost::Error>() {
        let status: StatusCode = (*e).into();
        return Ok(warp::reply::with_status(warp::reply(), status).into_response());
    }

    Err(err)
}
