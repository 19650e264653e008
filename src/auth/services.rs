use rand::{rngs::OsRng, RngCore};
use time::{Duration, OffsetDateTime};
use tracing::warn;
use url::Url;
use uuid::Uuid;

use crate::auth::repo_types::{PasswordReset, User};
use crate::config::AppConfig;

/// Lifetime of a password-reset grant.
pub const RESET_TTL: Duration = Duration::minutes(30);

const RESET_TOKEN_BYTES: usize = 24;

/// Trimmed, lowercased form used for every email lookup and write.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// A field counts as present when it is set and not blank.
pub(crate) fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// 24 random bytes from the OS generator, hex encoded (48 chars).
pub fn generate_reset_token() -> String {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn new_reset(email: &str, now: OffsetDateTime) -> PasswordReset {
    PasswordReset {
        id: Uuid::new_v4(),
        email: email.to_string(),
        token: generate_reset_token(),
        expires_at: now + RESET_TTL,
        created_at: now,
    }
}

pub struct Notice {
    pub subject: String,
    pub text: String,
    pub html: String,
}

pub fn registration_notice(user: &User) -> Notice {
    let text = format!(
        "Một tài khoản mới vừa đăng ký và đang chờ duyệt.\n\n\
         Tên: {}\nEmail: {}\nThời điểm: {}\n\n\
         Gọi POST /api/auth/approve với email và mã quản trị để kích hoạt.\n",
        user.name, user.email, user.created_at
    );
    let html = format!(
        r#"<p>Một tài khoản mới vừa đăng ký và đang chờ duyệt.</p>
<ul>
  <li>Tên: <strong>{name}</strong></li>
  <li>Email: <strong>{email}</strong></li>
  <li>Thời điểm: {created_at}</li>
</ul>
<p>Gọi <code>POST /api/auth/approve</code> với email và mã quản trị để kích hoạt.</p>"#,
        name = html_escape(&user.name),
        email = html_escape(&user.email),
        created_at = user.created_at,
    );
    Notice {
        subject: format!("Tài khoản mới chờ duyệt: {}", user.email),
        text,
        html,
    }
}

/// `{app_url}/reset-password?email=..&token=..` with both values query-encoded.
pub fn reset_link(app_url: &str, reset: &PasswordReset) -> Option<Url> {
    match Url::parse_with_params(
        &format!("{app_url}/reset-password"),
        &[("email", reset.email.as_str()), ("token", reset.token.as_str())],
    ) {
        Ok(url) => Some(url),
        Err(e) => {
            warn!(error = %e, app_url = %app_url, "cannot build reset link");
            None
        }
    }
}

pub fn reset_notice(config: &AppConfig, reset: &PasswordReset) -> Notice {
    let minutes = RESET_TTL.whole_minutes();
    let link = config
        .app_url
        .as_deref()
        .and_then(|base| reset_link(base, reset));

    let mut text = format!(
        "Bạn (hoặc ai đó) đã yêu cầu đặt lại mật khẩu.\n\n\
         Mã đặt lại: {}\n\
         Mã có hiệu lực trong {} phút.\n",
        reset.token, minutes
    );
    let mut html = format!(
        "<p>Bạn (hoặc ai đó) đã yêu cầu đặt lại mật khẩu.</p>\n\
         <p>Mã đặt lại: <code>{}</code></p>\n\
         <p>Mã có hiệu lực trong {} phút.</p>\n",
        reset.token, minutes
    );
    if let Some(link) = &link {
        text.push_str(&format!("\nHoặc mở liên kết: {link}\n"));
        html.push_str(&format!(
            "<p><a href=\"{href}\">Đặt lại mật khẩu</a></p>\n",
            href = html_escape(link.as_str())
        ));
    }
    text.push_str("\nNếu bạn không yêu cầu, hãy bỏ qua email này.\n");
    html.push_str("<p>Nếu bạn không yêu cầu, hãy bỏ qua email này.</p>");

    Notice {
        subject: "Đặt lại mật khẩu".into(),
        text,
        html,
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
