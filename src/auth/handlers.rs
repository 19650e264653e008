use axum::{
    extract::{FromRef, State},
    routing::post,
    Json, Router,
};
use subtle::ConstantTimeEq;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{
            ApproveRequest, ChangePasswordRequest, ForgotRequest, LoginRequest, LoginResponse,
            MessageResponse, PublicUser, RegisterRequest, ResetRequest,
        },
        jwt::{AuthUser, JwtKeys},
        password::{dummy_hash, hash_password_blocking, verify_password_blocking},
        repo::StoreError,
        repo_types::User,
        services::{new_reset, normalize_email, present, registration_notice, reset_notice},
    },
    error::{AppError, Result},
    state::AppState,
};

pub const MSG_MISSING_FIELDS: &str = "Thiếu thông tin";
pub const MSG_EMAIL_TAKEN: &str = "Email đã tồn tại";
pub const MSG_REGISTERED: &str = "Đăng ký thành công, vui lòng chờ quản trị viên duyệt";
pub const MSG_WRONG_ADMIN_CODE: &str = "Mã quản trị không đúng";
pub const MSG_APPROVED: &str = "Đã duyệt tài khoản";
pub const MSG_BAD_CREDENTIALS: &str = "Email hoặc mật khẩu không đúng";
pub const MSG_NOT_APPROVED: &str = "Tài khoản chưa được duyệt";
pub const MSG_FORGOT_SENT: &str = "Nếu email tồn tại, hướng dẫn đặt lại mật khẩu đã được gửi";
pub const MSG_INVALID_RESET: &str = "Token không hợp lệ";
pub const MSG_EXPIRED_RESET: &str = "Token đã hết hạn";
pub const MSG_RESET_DONE: &str = "Đặt lại mật khẩu thành công";
pub const MSG_USER_NOT_FOUND: &str = "Không tìm thấy người dùng";
pub const MSG_WRONG_OLD_PASSWORD: &str = "Mật khẩu cũ không đúng";
pub const MSG_PASSWORD_CHANGED: &str = "Đổi mật khẩu thành công";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/approve", post(approve))
        .route("/auth/login", post(login))
        .route("/auth/forgot", post(forgot))
        .route("/auth/reset", post(reset))
        .route("/auth/change-password", post(change_password))
}

fn missing_fields() -> AppError {
    AppError::bad_request(MSG_MISSING_FIELDS)
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Option<Json<RegisterRequest>>,
) -> Result<Json<MessageResponse>> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let (Some(name), Some(email), Some(password)) = (
        present(&payload.name),
        present(&payload.email),
        present(&payload.password),
    ) else {
        return Err(missing_fields());
    };
    let email = normalize_email(email);

    // Fast path only; the store's unique constraint is authoritative.
    if state.users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::bad_request(MSG_EMAIL_TAKEN));
    }

    let user = User {
        id: Uuid::new_v4(),
        name: name.trim().to_string(),
        email,
        pass_hash: hash_password_blocking(password.to_string()).await?,
        approved: false,
        created_at: OffsetDateTime::now_utc(),
    };

    match state.users.insert(&user).await {
        Ok(()) => {}
        Err(StoreError::Duplicate) => {
            warn!(email = %user.email, "email taken by concurrent registration");
            return Err(AppError::bad_request(MSG_EMAIL_TAKEN));
        }
        Err(e) => return Err(e.into()),
    }
    info!(user_id = %user.id, email = %user.email, "user registered");

    if let Some(admin) = &state.config.admin_email {
        let notice = registration_notice(&user);
        state
            .mailer
            .send(admin, &notice.subject, &notice.text, &notice.html)
            .await;
    }

    Ok(Json(MessageResponse::new(MSG_REGISTERED)))
}

#[instrument(skip(state, payload))]
pub async fn approve(
    State(state): State<AppState>,
    payload: Option<Json<ApproveRequest>>,
) -> Result<Json<MessageResponse>> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let (Some(email), Some(code)) = (present(&payload.email), present(&payload.code)) else {
        return Err(missing_fields());
    };
    let email = normalize_email(email);

    let expected = state.config.admin_code.as_bytes();
    if !bool::from(code.as_bytes().ct_eq(expected)) {
        warn!(email = %email, "approval with wrong admin code");
        return Err(AppError::Forbidden(MSG_WRONG_ADMIN_CODE.into()));
    }

    let touched = state.users.update_approved(&email, true).await?;
    if touched == 0 {
        warn!(email = %email, "approval for unknown email");
    } else {
        info!(email = %email, "user approved");
    }

    Ok(Json(MessageResponse::new(MSG_APPROVED)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Option<Json<LoginRequest>>,
) -> Result<Json<LoginResponse>> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let (Some(email), Some(password)) = (present(&payload.email), present(&payload.password))
    else {
        return Err(missing_fields());
    };
    let email = normalize_email(email);

    let Some(user) = state.users.find_by_email(&email).await? else {
        // same Argon2 cost as a wrong password
        verify_password_blocking(password.to_string(), dummy_hash().to_string()).await?;
        warn!(email = %email, "login unknown email");
        return Err(AppError::bad_request(MSG_BAD_CREDENTIALS));
    };

    if !verify_password_blocking(password.to_string(), user.pass_hash.clone()).await? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::bad_request(MSG_BAD_CREDENTIALS));
    }

    if !user.approved {
        warn!(user_id = %user.id, "login before approval");
        return Err(AppError::Forbidden(MSG_NOT_APPROVED.into()));
    }

    let token = JwtKeys::from_ref(&state)
        .issue(&user)
        .map_err(|e| AppError::Internal(e.into()))?;

    info!(user_id = %user.id, "user logged in");
    Ok(Json(LoginResponse {
        token,
        user: PublicUser {
            id: user.id,
            email: user.email,
            name: user.name,
        },
    }))
}

#[instrument(skip(state, payload))]
pub async fn forgot(
    State(state): State<AppState>,
    payload: Option<Json<ForgotRequest>>,
) -> Result<Json<MessageResponse>> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let Some(email) = present(&payload.email) else {
        return Err(missing_fields());
    };
    let email = normalize_email(email);

    if let Some(user) = state.users.find_by_email(&email).await? {
        let reset = new_reset(&user.email, OffsetDateTime::now_utc());
        state.resets.insert_reset(&reset).await?;
        info!(user_id = %user.id, reset_id = %reset.id, "reset token issued");

        let notice = reset_notice(&state.config, &reset);
        state
            .mailer
            .send(&user.email, &notice.subject, &notice.text, &notice.html)
            .await;
    } else {
        info!(email = %email, "reset requested for unknown email");
    }

    Ok(Json(MessageResponse::new(MSG_FORGOT_SENT)))
}

#[instrument(skip(state, payload))]
pub async fn reset(
    State(state): State<AppState>,
    payload: Option<Json<ResetRequest>>,
) -> Result<Json<MessageResponse>> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let (Some(email), Some(token), Some(new_password)) = (
        present(&payload.email),
        present(&payload.token),
        present(&payload.new_password),
    ) else {
        return Err(missing_fields());
    };
    let email = normalize_email(email);

    let Some(grant) = state.resets.find_reset(&email, token.trim()).await? else {
        warn!(email = %email, "reset with unknown token");
        return Err(AppError::bad_request(MSG_INVALID_RESET));
    };

    if grant.is_expired_at(OffsetDateTime::now_utc()) {
        warn!(email = %email, reset_id = %grant.id, "reset with expired token");
        return Err(AppError::bad_request(MSG_EXPIRED_RESET));
    }

    let pass_hash = hash_password_blocking(new_password.to_string()).await?;
    let touched = state.users.update_pass_hash(&email, &pass_hash).await?;
    state.resets.delete_reset(grant.id).await?;

    if touched == 0 {
        warn!(
            email = %email,
            reset_id = %grant.id,
            "reset grant for an account that no longer exists"
        );
    } else {
        info!(email = %email, reset_id = %grant.id, "password reset");
    }
    Ok(Json(MessageResponse::new(MSG_RESET_DONE)))
}

#[instrument(skip(state, claims, payload), fields(user_id = %claims.sub))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    payload: Option<Json<ChangePasswordRequest>>,
) -> Result<Json<MessageResponse>> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let Some(new_password) = present(&payload.new_password) else {
        return Err(missing_fields());
    };

    let Some(user) = state.users.find_by_id(claims.sub).await? else {
        warn!("token for a user that no longer exists");
        return Err(AppError::NotFound(MSG_USER_NOT_FOUND.into()));
    };

    let old_password = payload.old_password.clone().unwrap_or_default();
    if !verify_password_blocking(old_password, user.pass_hash.clone()).await? {
        warn!("change-password with wrong old password");
        return Err(AppError::bad_request(MSG_WRONG_OLD_PASSWORD));
    }

    let pass_hash = hash_password_blocking(new_password.to_string()).await?;
    state.users.update_pass_hash(&user.email, &pass_hash).await?;

    info!("password changed");
    Ok(Json(MessageResponse::new(MSG_PASSWORD_CHANGED)))
}
