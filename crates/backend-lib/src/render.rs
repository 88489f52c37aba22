//! Server-rendered pages.
use crate::storage::User;
use crate::validation::sanitize_string;
use account_common::{routes, Notice};
use std::fmt::Write;

/// Pages the account handlers can render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    /// Bare login form
    Index,
    /// Landing page; login and signup forms for anonymous visitors,
    /// a greeting for signed-in users
    Home,
}

/// Render `page` with the pending notices
pub fn render_page(page: Page, user: Option<&User>, notices: &[Notice]) -> String {
    let mut body = String::new();
    render_notices(&mut body, notices);

    match (page, user) {
        (Page::Home, Some(user)) => {
            let _ = write!(
                body,
                "<section class=\"welcome\"><h1>Welcome, {}</h1>\
                 <form method=\"post\" action=\"{}\"><button type=\"submit\">Log out</button></form>\
                 </section>",
                sanitize_string(&user.username),
                routes::LOGOUT
            );
        },
        (Page::Home, None) => {
            body.push_str(&login_form());
            body.push_str(&signup_form());
        },
        (Page::Index, _) => body.push_str(&login_form()),
    }

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\"><head><meta charset=\"utf-8\">\
         <title>Account</title></head><body>{body}</body></html>\n"
    )
}

fn render_notices(out: &mut String, notices: &[Notice]) {
    if notices.is_empty() {
        return;
    }
    out.push_str("<ul class=\"messages\">");
    for notice in notices {
        let _ = match &notice.field {
            Some(field) => write!(
                out,
                "<li class=\"{}\" data-field=\"{}\">{}</li>",
                notice.level.as_str(),
                sanitize_string(field),
                sanitize_string(&notice.text)
            ),
            None => write!(
                out,
                "<li class=\"{}\">{}</li>",
                notice.level.as_str(),
                sanitize_string(&notice.text)
            ),
        };
    }
    out.push_str("</ul>");
}

fn login_form() -> String {
    format!(
        "<form id=\"login\" method=\"post\" action=\"{}\">\
         <input name=\"email_or_username\" placeholder=\"Email or username\">\
         <input name=\"password\" type=\"password\" placeholder=\"Password\">\
         <button type=\"submit\">Log in</button></form>",
        routes::LOGIN
    )
}

fn signup_form() -> String {
    format!(
        "<form id=\"signup\" method=\"post\" action=\"{}\">\
         <input name=\"username\" placeholder=\"Username\">\
         <input name=\"email\" type=\"email\" placeholder=\"Email\">\
         <input name=\"password\" type=\"password\" placeholder=\"Password\">\
         <input name=\"password_confirm\" type=\"password\" placeholder=\"Confirm password\">\
         <button type=\"submit\">Sign up</button></form>",
        routes::SIGNUP
    )
}
