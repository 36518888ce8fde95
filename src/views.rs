//! Server-rendered pages for the identity surface. The site's real templates
//! live elsewhere; these carry just what login, registration and user
//! administration need.

use std::borrow::Cow;
use std::fmt::Write;

use crate::user::User;

pub const INVALID_CREDENTIALS: &str = "Invalid username or password";
pub const AUTH_FAILED: &str = "Authentication error. Please try again.";
pub const REGISTERED: &str = "Registration successful! Please login.";

pub fn escape(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn page(title: &str, body: &str) -> String {
    format!(
        concat!(
            "<!DOCTYPE html>\n",
            "<html><head><meta charset=\"utf-8\"><title>{}</title></head>\n",
            "<body>\n{}</body></html>\n",
        ),
        escape(title),
        body,
    )
}

fn notices(body: &mut String, error: Option<&str>, success: Option<&str>) {
    if let Some(error) = error {
        let _ = writeln!(body, "<p class=\"alert error\">{}</p>", escape(error));
    }
    if let Some(success) = success {
        let _ = writeln!(body, "<p class=\"alert success\">{}</p>", escape(success));
    }
}

pub fn login(error: Option<&str>, success: Option<&str>) -> String {
    let mut body = String::new();
    notices(&mut body, error, success);

    body.push_str(concat!(
        "<form method=\"post\" action=\"/login\">\n",
        "<input name=\"username\" required>\n",
        "<input name=\"password\" type=\"password\" required>\n",
        "<button type=\"submit\">Login</button>\n",
        "</form>\n",
        "<form method=\"post\" action=\"/register\">\n",
        "<input name=\"reg_username\" required>\n",
        "<input name=\"reg_email\" type=\"email\">\n",
        "<input name=\"reg_password\" type=\"password\" required>\n",
        "<button type=\"submit\">Register</button>\n",
        "</form>\n",
    ));

    page("Login", &body)
}

pub fn landing(user: Option<&User>) -> String {
    let body = match user {
        Some(user) => format!(
            "<p>Welcome back, {}. <a href=\"/logout\">Logout</a></p>\n",
            escape(&user.username)
        ),
        None => "<p><a href=\"/login\">Login or register</a></p>\n".to_string(),
    };

    page("Tourism Guide", &body)
}

pub fn account(user: &User) -> String {
    let body = format!(
        "<h1>{}</h1>\n<p>Email: {}</p>\n<p>Role: {}</p>\n<p>Member since {}</p>\n",
        escape(&user.username),
        escape(user.email.as_deref().unwrap_or("-")),
        user.role,
        user.created_at,
    );

    page("My Account", &body)
}

pub fn dashboard(admin: &User, user_count: usize) -> String {
    let body = format!(
        concat!(
            "<h1>Dashboard</h1>\n",
            "<p>Signed in as {}.</p>\n",
            "<p><a href=\"/admin/users\">{} users</a></p>\n",
        ),
        escape(&admin.username),
        user_count,
    );

    page("Admin Dashboard", &body)
}

fn notice_text(code: &str) -> Option<&'static str> {
    Some(match code {
        "role_updated" => "User role updated.",
        "deleted" => "User deleted.",
        "cannot_modify_self" => "You cannot change your own role.",
        "cannot_delete_self" => "You cannot delete your own account.",
        "not_found" => "No such user.",
        _ => return None,
    })
}

pub fn users(
    current: &User,
    users: &[User],
    success: Option<&str>,
    error: Option<&str>,
) -> String {
    let mut body = String::from("<h1>Users</h1>\n");
    notices(
        &mut body,
        error.and_then(notice_text),
        success.and_then(notice_text),
    );

    body.push_str(concat!(
        "<table>\n",
        "<tr><th>Username</th><th>Email</th><th>Role</th><th>Joined</th><th></th></tr>\n",
    ));
    for user in users {
        let actions = if user.id == current.id {
            String::new()
        } else {
            format!(
                concat!(
                    "<form method=\"post\" action=\"/admin/users/toggle/{id}\">",
                    "<button type=\"submit\">Toggle role</button></form> ",
                    "<form method=\"post\" action=\"/admin/users/delete/{id}\">",
                    "<button type=\"submit\">Delete</button></form>",
                ),
                id = user.id
            )
        };

        let _ = writeln!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&user.username),
            escape(user.email.as_deref().unwrap_or("")),
            user.role,
            user.created_at,
            actions,
        );
    }
    body.push_str("</table>\n");

    page("Manage Users", &body)
}
