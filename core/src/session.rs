//! Sign-in state and the cached user profile.

use anyhow::{Context, Result, bail};
use chrono::Local;
use tracing::{info, warn};
use uuid::Uuid;

use crate::identity::GoogleClaims;
use crate::models::{
    AuthMethod, Goal, ProfileUpdate, Registration, SyncOp, UserProfile, validate_profile,
    validate_registration,
};
use crate::remote::RemoteSession;
use crate::service::Tracker;

/// Build the profile described by a validated registration form.
fn profile_from_registration(user_id: &str, email: &str, reg: &Registration) -> UserProfile {
    let now = Local::now().to_rfc3339();
    let target_weight_kg = if reg.goal == Some(Goal::Maintain) {
        reg.weight_kg
    } else {
        reg.target_weight_kg
    };
    UserProfile {
        id: user_id.to_string(),
        email: email.to_string(),
        auth_method: AuthMethod::Password,
        full_name: Some(reg.full_name.trim().to_string()),
        sex: reg.sex,
        birth_place: Some(reg.birth_place.trim().to_string()),
        birth_date: reg.birth_date,
        blood_type: Some(reg.blood_type.trim().to_uppercase()),
        height_cm: reg.height_cm,
        weight_kg: reg.weight_kg,
        phone: Some(reg.phone.trim().to_string()),
        goal: reg.goal,
        target_weight_kg,
        profile_completed: true,
        created_at: Some(now.clone()),
        updated_at: Some(now),
        ..UserProfile::default()
    }
}

/// Keep locally derived metrics the remote projection does not carry.
fn carry_local_fields(remote: &mut UserProfile, cached: Option<&UserProfile>) {
    let Some(cached) = cached.filter(|c| c.id == remote.id) else {
        return;
    };
    remote.bmr = remote.bmr.or(cached.bmr);
    remote.tdee = remote.tdee.or(cached.tdee);
    remote.target_calories = remote.target_calories.or(cached.target_calories);
    if remote.email.is_empty() {
        remote.email.clone_from(&cached.email);
    }
}

impl Tracker {
    /// Stored remote session, if any. An unreadable one is treated as absent.
    pub fn session(&self) -> Result<Option<RemoteSession>> {
        let Some(json) = self.db.session_json()? else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(error = %e, "ignoring unreadable stored session");
                Ok(None)
            }
        }
    }

    fn store_session(&self, session: &RemoteSession) -> Result<()> {
        self.db.set_session_json(&serde_json::to_string(session)?)
    }

    pub fn current_user_id(&self) -> Result<Option<String>> {
        self.db.current_user_id()
    }

    pub fn require_user(&self) -> Result<String> {
        self.db
            .current_user_id()?
            .context("Not logged in. Run `calori auth login` first")
    }

    pub fn cached_profile(&self) -> Result<Option<UserProfile>> {
        match self.db.current_user_id()? {
            Some(user_id) => self.db.get_profile(&user_id),
            None => Ok(None),
        }
    }

    fn adopt_profile(&self, mut profile: UserProfile) -> Result<UserProfile> {
        let cached = self.db.get_profile(&profile.id)?;
        carry_local_fields(&mut profile, cached.as_ref());
        self.db.save_profile(&profile)?;
        self.db.set_current_user_id(&profile.id)?;
        Ok(profile)
    }

    async fn fetch_remote_profile(&self, user_id: &str) -> Option<UserProfile> {
        let store = self.store.clone()?;
        match store.fetch_profile(user_id).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(user_id = %user_id, error = %format!("{e:#}"), "profile fetch failed");
                None
            }
        }
    }

    async fn push_profile(&self, profile: &UserProfile) -> Result<()> {
        if !self.has_remote() {
            return Ok(());
        }
        self.db.enqueue_sync(
            &profile.id,
            &SyncOp::UpsertProfile {
                profile: Box::new(profile.clone()),
            },
        )?;
        self.flush_sync_queue().await?;
        Ok(())
    }

    /// The signed-in user's profile, refreshed from the remote store when the
    /// stored session is still accepted. Falls back to the cache otherwise.
    pub async fn resolve_current_user(&self) -> Result<Option<UserProfile>> {
        let cached = self.cached_profile()?;
        let (Some(auth), Some(session)) = (self.auth.clone(), self.session()?) else {
            return Ok(cached);
        };
        let user = match auth.get_user(&session.access_token).await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "stored session rejected, using cached profile");
                return Ok(cached);
            }
        };
        match self.fetch_remote_profile(&user.id).await {
            Some(profile) => self.adopt_profile(profile).map(Some),
            None => Ok(cached),
        }
    }

    pub async fn register(&self, reg: &Registration) -> Result<UserProfile> {
        let errors = validate_registration(reg, self.today());
        if !errors.is_empty() {
            bail!("Registration is invalid:\n  {}", errors.join("\n  "));
        }
        let email = reg.email.trim().to_lowercase();

        let user_id = match &self.auth {
            Some(auth) => {
                let session = auth
                    .sign_up(&email, &reg.password)
                    .await
                    .context("Sign-up failed")?;
                self.store_session(&session)?;
                session.user.id
            }
            None => {
                if self.db.find_profile_by_email(&email)?.is_some() {
                    bail!("An account for {email} already exists on this device");
                }
                format!("local-{}", Uuid::new_v4())
            }
        };

        let profile = profile_from_registration(&user_id, &email, reg);
        self.db.save_profile(&profile)?;
        self.db.set_current_user_id(&user_id)?;
        self.push_profile(&profile).await?;
        info!(user_id = %user_id, "registered");
        Ok(profile)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile> {
        let email = email.trim().to_lowercase();
        let Some(auth) = self.auth.clone() else {
            let profile = self
                .db
                .find_profile_by_email(&email)?
                .with_context(|| format!("No account for {email} on this device"))?;
            self.db.set_current_user_id(&profile.id)?;
            return Ok(profile);
        };

        let session = auth
            .sign_in_with_password(&email, password)
            .await
            .context("Sign-in failed")?;
        self.store_session(&session)?;

        let profile = match self.fetch_remote_profile(&session.user.id).await {
            Some(profile) => profile,
            None => self
                .db
                .get_profile(&session.user.id)?
                .unwrap_or_else(|| UserProfile {
                    id: session.user.id.clone(),
                    email: session.user.email.clone().unwrap_or_else(|| email.clone()),
                    ..UserProfile::default()
                }),
        };
        let profile = self.adopt_profile(profile)?;
        info!(user_id = %profile.id, "signed in");
        Ok(profile)
    }

    /// Sign in with an already verified Google ID token.
    ///
    /// Returns the profile and whether it still needs the completion form.
    pub async fn login_with_google(
        &self,
        claims: &GoogleClaims,
        id_token: &str,
    ) -> Result<(UserProfile, bool)> {
        let auth = self
            .auth
            .clone()
            .context("Google sign-in needs a remote backend. Set supabase_url in the config")?;
        let session = auth
            .sign_in_with_id_token("google", id_token)
            .await
            .context("Google sign-in failed")?;
        self.store_session(&session)?;

        let (profile, is_new) = match self.fetch_remote_profile(&session.user.id).await {
            Some(profile) => (profile, false),
            None => match self.db.get_profile(&session.user.id)? {
                Some(cached) => (cached, false),
                None => (claims.new_profile(&session.user.id), true),
            },
        };
        let profile = self.adopt_profile(profile)?;
        if is_new {
            self.push_profile(&profile).await?;
        }
        let needs_completion = !profile.profile_completed;
        info!(user_id = %profile.id, needs_completion, "signed in with Google");
        Ok((profile, needs_completion))
    }

    /// Apply a profile edit locally, then push it.
    ///
    /// An incomplete profile accepts partial edits and becomes complete once
    /// every field validates. A complete profile only accepts valid edits.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<UserProfile> {
        let user_id = self.require_user()?;
        let mut profile = self
            .db
            .get_profile(&user_id)?
            .context("No cached profile for the current user")?;
        let was_complete = profile.profile_completed;
        update.apply(&mut profile);

        let errors = validate_profile(&profile, self.today());
        if errors.is_empty() {
            profile.profile_completed = true;
        } else if was_complete {
            bail!("Profile is invalid:\n  {}", errors.join("\n  "));
        }
        profile.updated_at = Some(Local::now().to_rfc3339());

        self.db.save_profile(&profile)?;
        self.push_profile(&profile).await?;
        Ok(profile)
    }

    /// Sign out and drop everything cached for the current user.
    pub async fn logout(&mut self) -> Result<()> {
        let Some(user_id) = self.db.current_user_id()? else {
            return Ok(());
        };
        if let Err(e) = self.flush_sync_queue().await {
            warn!(error = %format!("{e:#}"), "final sync before logout failed");
        }
        if let (Some(auth), Some(session)) = (self.auth.clone(), self.session()?) {
            if let Err(e) = auth.sign_out(&session.access_token).await {
                warn!(error = %format!("{e:#}"), "remote sign-out failed");
            }
        }
        self.db.clear_user_data(&user_id)?;
        self.db.delete_profile(&user_id)?;
        self.db.clear_session()?;
        info!(user_id = %user_id, "signed out");
        Ok(())
    }
}
