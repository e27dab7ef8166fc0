//! Authentication commands.

use super::{to_stored, AppContext};
use crate::output::{self, OutputFormat};
use anyhow::Result;
use chrono::Utc;
use std::io::{self, Write};
use tracing::info;

/// Login with email and password.
pub async fn login(format: &OutputFormat) -> Result<()> {
    let ctx = AppContext::load()?;

    if let Some(existing) = ctx.sessions.load()? {
        if !existing.is_expired(Utc::now()) {
            let who = existing.email.as_deref().unwrap_or(&existing.user_id);
            output::print_success(&format!("Already logged in as {}", who), format);
            return Ok(());
        }
    }

    print!("Email: ");
    io::stdout().flush()?;
    let mut email = String::new();
    io::stdin().read_line(&mut email)?;
    let email = email.trim().to_string();

    if email.is_empty() {
        output::print_error("Email is required", format);
        return Ok(());
    }

    let password = rpassword::prompt_password("Password: ")?;
    if password.is_empty() {
        output::print_error("Password is required", format);
        return Ok(());
    }

    println!("Logging in...");

    match ctx.client.sign_in_with_password(&email, &password).await {
        Ok(session) => {
            let stored = to_stored(&session);
            ctx.sessions.save(&stored)?;
            info!(user_id = %stored.user_id, "Logged in");
            let who = stored.email.as_deref().unwrap_or(&stored.user_id);
            output::print_success(&format!("Logged in as {}", who), format);
        }
        Err(e) => {
            output::print_error(&format!("Login failed: {}", e), format);
        }
    }

    Ok(())
}

/// Logout and clear session.
pub async fn logout(format: &OutputFormat) -> Result<()> {
    let ctx = AppContext::load()?;
    if ctx.sessions.clear()? {
        info!("Logged out");
        output::print_success("Logged out successfully", format);
    } else {
        output::print_success("Not logged in", format);
    }
    Ok(())
}

/// Check authentication status.
pub async fn status(format: &OutputFormat) -> Result<()> {
    let ctx = AppContext::load()?;
    let session = ctx.sessions.load()?;
    let now = Utc::now();
    let logged_in = session.as_ref().is_some_and(|s| !s.is_expired(now));
    let ai_configured = ctx.completion().is_ok();

    match format {
        OutputFormat::Text => {
            match &session {
                Some(session) => {
                    println!(
                        "Auth:       {}",
                        if logged_in { "logged in" } else { "expired (run 'saathi login')" }
                    );
                    println!("User ID:    {}", session.user_id);
                    if let Some(email) = &session.email {
                        println!("Email:      {}", email);
                    }
                    let expires = session
                        .expires_at_utc()
                        .map(|at| at.to_rfc3339())
                        .unwrap_or_else(|| "unknown".to_string());
                    println!("Expires:    {}", expires);
                }
                None => println!("Auth:       not logged in"),
            }
            println!("Backend:    {}", ctx.config.supabase_url);
            println!(
                "Assistant:  {} ({})",
                if ai_configured { "configured" } else { "not configured, set SAATHI_AI_API_KEY" },
                ctx.config.completion_model
            );
        }
        OutputFormat::Json => {
            output::print_json(&serde_json::json!({
                "logged_in": logged_in,
                "user_id": session.as_ref().map(|s| &s.user_id),
                "email": session.as_ref().and_then(|s| s.email.as_ref()),
                "expires_at": session.as_ref().and_then(|s| s.expires_at_utc()),
                "supabase_url": ctx.config.supabase_url,
                "completion_model": ctx.config.completion_model,
                "assistant_configured": ai_configured,
            }));
        }
    }

    Ok(())
}
