use anyhow::Result;

use calori_core::models::{ProfileUpdate, UserProfile};
use calori_core::service::Tracker;

use super::helpers::{or_dash, print_json};

pub(crate) fn print_profile(profile: &UserProfile, today: chrono::NaiveDate) {
    println!("  {} <{}>", profile.name(), profile.email);
    println!("  Sex:          {}", or_dash(profile.sex.map(|s| s.as_wire())));
    println!(
        "  Born:         {} in {} (age {})",
        or_dash(profile.birth_date),
        or_dash(profile.birth_place.as_deref()),
        or_dash(profile.age_on(today))
    );
    println!("  Blood type:   {}", or_dash(profile.blood_type.as_deref()));
    println!("  Phone:        {}", or_dash(profile.phone.as_deref()));
    println!(
        "  Height:       {}",
        or_dash(profile.height_cm.map(|h| format!("{h:.0} cm")))
    );
    println!(
        "  Weight:       {}",
        or_dash(profile.weight_kg.map(|w| format!("{w:.1} kg")))
    );
    println!(
        "  Goal:         {} (target {})",
        or_dash(profile.goal),
        or_dash(profile.target_weight_kg.map(|w| format!("{w:.1} kg")))
    );
    if let Some(target) = profile.target_calories {
        println!("  Calories/day: {target:.0} kcal");
    }
    if !profile.profile_completed {
        println!("\n  Profile incomplete. Run `calori profile edit` to fill in the missing fields.");
    }
}

pub(crate) async fn cmd_profile_show(tracker: &Tracker, json: bool) -> Result<()> {
    tracker.require_user()?;
    let profile = tracker.resolve_current_user().await?;
    if json {
        return print_json(&profile);
    }
    match profile {
        Some(p) => print_profile(&p, tracker.today()),
        None => eprintln!("No profile cached for the current user"),
    }
    Ok(())
}

pub(crate) async fn cmd_profile_edit(
    tracker: &Tracker,
    update: ProfileUpdate,
    json: bool,
) -> Result<()> {
    let profile = tracker.update_profile(update).await?;
    if json {
        return print_json(&profile);
    }
    println!("Profile updated\n");
    print_profile(&profile, tracker.today());
    Ok(())
}
