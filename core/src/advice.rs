//! AI feedback: prompt construction and a generation seam that never fails.

use std::str::FromStr;

use anyhow::bail;
use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::models::{ActivityBundle, ActivityDetail, UserProfile};
use crate::stats::{self, DayBoundary};

const DEFAULT_WEIGHT_KG: f64 = 70.0;
const DEFAULT_HEIGHT_CM: f64 = 170.0;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("text generation is not configured")]
    NotConfigured,
    #[error("model endpoint not found")]
    NotFound,
    #[error("API key rejected")]
    Forbidden,
    #[error("too many requests")]
    RateLimited,
    #[error("response contained no text")]
    InvalidResponse,
    #[error("{0}")]
    Other(String),
}

impl GenerationError {
    /// Text shown to the user in place of advice.
    #[must_use]
    pub fn placeholder(&self) -> String {
        match self {
            GenerationError::NotConfigured => {
                "AI feedback is not configured. Set GEMINI_API_KEY to enable it.".to_string()
            }
            GenerationError::NotFound => {
                "AI feedback unavailable: the model endpoint was not found. Check the model name."
                    .to_string()
            }
            GenerationError::Forbidden => {
                "AI feedback unavailable: the API key is invalid or not enabled.".to_string()
            }
            GenerationError::RateLimited => {
                "AI feedback is busy right now. Please try again in a moment.".to_string()
            }
            GenerationError::InvalidResponse => {
                "AI feedback returned an unexpected response. Please try again.".to_string()
            }
            GenerationError::Other(msg) => {
                format!("AI feedback unavailable: {msg}")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: 1000,
            top_p: 0.8,
            top_k: 10,
        }
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> Result<String, GenerationError>;
}

/// Generate advice for `prompt`, substituting a placeholder on any failure.
pub async fn advise(generator: Option<&dyn TextGenerator>, prompt: &str) -> String {
    let Some(generator) = generator else {
        return GenerationError::NotConfigured.placeholder();
    };
    match generator.generate(prompt, GenerationParams::default()).await {
        Ok(text) => {
            debug!(chars = text.len(), "advice generated");
            text
        }
        Err(e) => {
            warn!(error = %e, "advice generation failed");
            e.placeholder()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdviceTopic {
    Steps,
    Running,
    Water,
    Sleep,
    Gym,
    Food,
    Overview,
}

impl FromStr for AdviceTopic {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "steps" => Ok(AdviceTopic::Steps),
            "running" | "run" => Ok(AdviceTopic::Running),
            "water" => Ok(AdviceTopic::Water),
            "sleep" => Ok(AdviceTopic::Sleep),
            "gym" => Ok(AdviceTopic::Gym),
            "food" | "nutrition" => Ok(AdviceTopic::Food),
            "overview" | "daily" => Ok(AdviceTopic::Overview),
            _ => bail!(
                "Unknown topic '{s}'. Use steps, running, water, sleep, gym, food or overview"
            ),
        }
    }
}

/// Body measurements used in prompts, with fallbacks for incomplete profiles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyContext {
    pub weight_kg: f64,
    pub height_cm: f64,
    pub age: u32,
}

impl BodyContext {
    #[must_use]
    pub fn from_profile(profile: Option<&UserProfile>, today: NaiveDate) -> Self {
        let fallback_birth = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap_or_default();
        let birth = profile.and_then(|p| p.birth_date).unwrap_or(fallback_birth);
        Self {
            weight_kg: profile.and_then(|p| p.weight_kg).unwrap_or(DEFAULT_WEIGHT_KG),
            height_cm: profile.and_then(|p| p.height_cm).unwrap_or(DEFAULT_HEIGHT_CM),
            age: today.years_since(birth).unwrap_or(0),
        }
    }
}

fn recommended_sleep(age: u32) -> &'static str {
    if age < 18 {
        "8-10 hours"
    } else if age < 65 {
        "7-9 hours"
    } else {
        "7-8 hours"
    }
}

/// Build the prompt for `topic`, or `None` when there is nothing to analyze yet.
#[must_use]
pub fn build_prompt(
    topic: AdviceTopic,
    bundle: &ActivityBundle,
    profile: Option<&UserProfile>,
    boundary: DayBoundary,
    today: NaiveDate,
) -> Option<String> {
    let body = BodyContext::from_profile(profile, today);
    let day = stats::day_totals(bundle, boundary, today);
    let mut lines: Vec<String> = Vec::new();

    match topic {
        AdviceTopic::Steps => {
            if day.steps == 0 {
                return None;
            }
            lines.push("You are a health and fitness expert. Analyze this step data:".to_string());
            lines.push(format!("- Steps today: {}", day.steps));
            lines.push(format!("- Weight: {:.0} kg", body.weight_kg));
            lines.push(format!("- Height: {:.0} cm", body.height_cm));
            lines.push(
                "\nGive a short analysis (at most 150 words) covering:\n\
                 1. Whether the step count is enough (WHO target: 10,000 steps/day)\n\
                 2. Health benefits of this activity\n\
                 3. Suggestions to increase activity if it falls short"
                    .to_string(),
            );
        }
        AdviceTopic::Running => {
            if day.running_km <= 0.0 {
                return None;
            }
            lines.push("You are a professional running coach. Analyze this running data:".to_string());
            lines.push(format!("- Distance today: {:.1} km", day.running_km));
            lines.push(format!("- Weight: {:.0} kg", body.weight_kg));
            lines.push(
                "\nGive a short analysis (at most 150 words):\n\
                 1. Evaluate the distance (beginner 3-5 km, intermediate 5-10 km, advanced >10 km)\n\
                 2. Cardiovascular and fat-burning benefits\n\
                 3. Pace and recovery suggestions\n\
                 4. Tips to improve performance"
                    .to_string(),
            );
        }
        AdviceTopic::Water => {
            let week = stats::water_period_totals(&bundle.water, today, 7);
            if day.water_liters <= 0.0 && week.entries == 0 {
                return None;
            }
            lines.push("You are a hydration and nutrition expert. Analyze this water intake:".to_string());
            lines.push(format!("- Water today: {:.2} L", day.water_liters));
            lines.push(format!("- Average over the last 7 days: {:.2} L", week.average));
            lines.push(format!("- Weight: {:.0} kg", body.weight_kg));
            lines.push(
                "\nGive a short analysis (at most 150 words):\n\
                 1. Whether intake meets the 2-3 L/day guideline for this body weight\n\
                 2. Signs of under-hydration to watch for\n\
                 3. Practical habits to drink more consistently"
                    .to_string(),
            );
        }
        AdviceTopic::Sleep => {
            let last = stats::last_sleep(bundle)?;
            let recent: Vec<String> = bundle
                .sleep
                .iter()
                .take(7)
                .map(|r| format!("{:.1}", r.detail.amount()))
                .collect();
            let all = stats::period_totals(&bundle.sleep, boundary, today, 90);
            lines.push("You are a sleep specialist. Analyze this sleep pattern:".to_string());
            lines.push(format!("- Last night: {:.1} hours", last.detail.amount()));
            lines.push(format!("- Average sleep: {:.1} hours", all.average));
            lines.push(format!("- Most recent nights: {} hours", recent.join(", ")));
            lines.push(format!("- Age: {} years", body.age));
            lines.push(format!(
                "- Recommended sleep for this age: {}",
                recommended_sleep(body.age)
            ));
            lines.push(
                "\nGive a thorough analysis (at most 250 words):\n\
                 1. Whether sleep is too short, optimal or too long\n\
                 2. Health impact of this pattern\n\
                 3. How sleep relates to metabolism and recovery\n\
                 4. Ways to improve sleep quality (hygiene, schedule, evening routine, environment)\n\
                 5. Warnings about any unhealthy pattern"
                    .to_string(),
            );
        }
        AdviceTopic::Gym => {
            if bundle.gym.is_empty() {
                return None;
            }
            let week = stats::period_totals(&bundle.gym, boundary, today, 7);
            let recent: Vec<String> = bundle
                .gym
                .iter()
                .take(5)
                .filter_map(|r| match &r.detail {
                    ActivityDetail::Gym {
                        category,
                        exercise,
                        duration_min,
                    } => Some(format!("{exercise} ({category}, {duration_min} min)")),
                    _ => None,
                })
                .collect();
            lines.push("You are a professional personal trainer. Analyze this gym activity:".to_string());
            lines.push(format!("- Total sessions: {}", bundle.gym.len()));
            lines.push(format!("- Sessions this week: {}", week.entries));
            lines.push(format!("- Last 5 sessions: {}", recent.join(", ")));
            lines.push(format!("- Weight: {:.0} kg", body.weight_kg));
            lines.push(
                "\nGive a complete program recommendation (at most 250 words):\n\
                 1. Evaluate training frequency (ideal 3-5 times a week)\n\
                 2. Analyze the types of training in the history\n\
                 3. Suggest a split (push/pull/legs or upper/lower)\n\
                 4. Specific exercises for each day\n\
                 5. Progressive overload and recovery tips"
                    .to_string(),
            );
        }
        AdviceTopic::Food => {
            if day.calories_in <= 0.0 {
                return None;
            }
            let foods: Vec<String> = bundle
                .food
                .iter()
                .filter(|r| boundary.day_of(r.date) == today)
                .filter_map(|r| match &r.detail {
                    ActivityDetail::Food { name, calories, .. } => {
                        Some(format!("{name} ({calories:.0} kcal)"))
                    }
                    _ => None,
                })
                .collect();
            lines.push("You are a professional nutritionist. Analyze today's intake:".to_string());
            lines.push("\nNUTRITION:".to_string());
            lines.push(format!("- Calories in: {:.0} kcal", day.calories_in));
            lines.push(format!("- Carbohydrates: {:.0} g", day.carbs_g));
            lines.push(format!("- Protein: {:.0} g", day.protein_g));
            lines.push(format!("- Fat: {:.0} g", day.fat_g));
            lines.push(format!("- Foods eaten: {}", foods.join(", ")));
            lines.push("\nUSER:".to_string());
            lines.push(format!("- Weight: {:.0} kg", body.weight_kg));
            lines.push(format!("- Height: {:.0} cm", body.height_cm));
            lines.push(format!("- Age: {} years", body.age));
            if let Some(target) = profile.and_then(|u| u.target_calories) {
                lines.push(format!("- Daily calorie target: {target:.0} kcal"));
            }
            lines.push(format!("- Steps today: {}", day.steps));
            lines.push(format!("- Running today: {:.1} km", day.running_km));
            lines.push(
                "\nGive an in-depth analysis (at most 300 words):\n\
                 1. Calorie balance: deficit, surplus or maintenance, and portion adjustments\n\
                 2. Macronutrients: protein for recovery, carbohydrates for energy, healthy fats\n\
                 3. Micronutrients and variety\n\
                 4. Activity or food additions depending on the balance\n\
                 5. Foods to add, foods to reduce and a healthy menu for tomorrow\n\
                 6. Hydration (2-3 L/day) and fiber (25-30 g/day)"
                    .to_string(),
            );
        }
        AdviceTopic::Overview => {
            let overview = stats::overview(bundle, boundary, today);
            let t = &overview.today;
            if t.steps == 0
                && t.running_km <= 0.0
                && t.gym_sessions == 0
                && t.calories_in <= 0.0
                && t.water_liters <= 0.0
                && overview.last_sleep_hours.is_none()
            {
                return None;
            }
            lines.push("You are a friendly health coach. Summarize this user's day:".to_string());
            lines.push(format!("- Steps: {}", t.steps));
            lines.push(format!("- Running: {:.1} km", t.running_km));
            lines.push(format!("- Gym: {} sessions, {} minutes", t.gym_sessions, t.gym_minutes));
            lines.push(format!("- Calories eaten: {:.0} kcal", t.calories_in));
            lines.push(format!("- Water: {:.2} L", t.water_liters));
            if let Some(h) = overview.last_sleep_hours {
                lines.push(format!("- Last sleep: {h:.1} hours"));
            }
            lines.push(format!(
                "- Weekly step goal progress: {:.0}%",
                overview.weekly_step_progress_pct
            ));
            lines.push(format!("- Activity streak: {} days", overview.streak_days));
            if let Some(goal) = profile.and_then(|u| u.goal) {
                lines.push(format!("- Goal: {goal} weight"));
            }
            lines.push(format!(
                "- Weight: {:.0} kg, height {:.0} cm, age {}",
                body.weight_kg, body.height_cm, body.age
            ));
            lines.push(
                "\nGive encouraging feedback (at most 200 words) with the top three things to focus on tomorrow."
                    .to_string(),
            );
        }
    }

    lines.push("Format the answer with emoji and short, easy-to-read paragraphs.".to_string());
    Some(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActivityRecord;
    use chrono::{FixedOffset, TimeZone, Utc};
    use std::sync::Mutex;

    struct FixedGenerator {
        result: Mutex<Option<Result<String, GenerationError>>>,
        seen: Mutex<Vec<(String, GenerationParams)>>,
    }

    impl FixedGenerator {
        fn new(result: Result<String, GenerationError>) -> Self {
            Self {
                result: Mutex::new(Some(result)),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate(
            &self,
            prompt: &str,
            params: GenerationParams,
        ) -> Result<String, GenerationError> {
            self.seen.lock().unwrap().push((prompt.to_string(), params));
            self.result
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(GenerationError::InvalidResponse))
        }
    }

    fn utc() -> DayBoundary {
        DayBoundary::Fixed(FixedOffset::east_opt(0).unwrap())
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    fn bundle_with_steps(n: u32) -> ActivityBundle {
        ActivityBundle {
            steps: vec![ActivityRecord {
                uuid: None,
                date: Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap(),
                detail: ActivityDetail::Steps { steps: n },
            }],
            ..ActivityBundle::default()
        }
    }

    #[tokio::test]
    async fn test_advise_passes_text_through() {
        let generator = FixedGenerator::new(Ok("Great job!".to_string()));
        let out = advise(Some(&generator), "prompt").await;
        assert_eq!(out, "Great job!");
        let seen = generator.seen.lock().unwrap();
        assert_eq!(seen[0].1, GenerationParams::default());
    }

    #[tokio::test]
    async fn test_advise_placeholders() {
        assert!(advise(None, "p").await.contains("not configured"));

        let cases = [
            (GenerationError::NotFound, "not found"),
            (GenerationError::Forbidden, "invalid"),
            (GenerationError::RateLimited, "busy"),
            (GenerationError::InvalidResponse, "unexpected response"),
            (GenerationError::Other("timeout".to_string()), "timeout"),
        ];
        for (err, needle) in cases {
            let generator = FixedGenerator::new(Err(err));
            let out = advise(Some(&generator), "p").await;
            assert!(out.contains(needle), "{out}");
        }
    }

    #[test]
    fn test_steps_prompt_includes_metrics_and_defaults() {
        let prompt =
            build_prompt(AdviceTopic::Steps, &bundle_with_steps(8421), None, utc(), today())
                .unwrap();
        assert!(prompt.contains("Steps today: 8421"));
        assert!(prompt.contains("Weight: 70 kg"));
        assert!(prompt.contains("Height: 170 cm"));
    }

    #[test]
    fn test_prompt_layout() {
        let prompt =
            build_prompt(AdviceTopic::Steps, &bundle_with_steps(8421), None, utc(), today())
                .unwrap();
        let lines: Vec<&str> = prompt.lines().collect();
        assert_eq!(
            lines[..3],
            [
                "You are a health and fitness expert. Analyze this step data:",
                "- Steps today: 8421",
                "- Weight: 70 kg",
            ]
        );
        assert!(prompt.contains("- Height: 170 cm\n\nGive a short analysis"));
        assert!(prompt.ends_with("falls short\nFormat the answer with emoji and short, easy-to-read paragraphs."));
    }

    #[test]
    fn test_prompt_uses_profile() {
        let profile = UserProfile {
            id: "u1".to_string(),
            weight_kg: Some(82.0),
            birth_date: NaiveDate::from_ymd_opt(2000, 1, 1),
            ..UserProfile::default()
        };
        let body = BodyContext::from_profile(Some(&profile), today());
        assert_eq!(body.age, 24);
        let prompt = build_prompt(
            AdviceTopic::Steps,
            &bundle_with_steps(100),
            Some(&profile),
            utc(),
            today(),
        )
        .unwrap();
        assert!(prompt.contains("Weight: 82 kg"));
    }

    #[test]
    fn test_no_prompt_without_data() {
        let empty = ActivityBundle::default();
        for topic in [
            AdviceTopic::Steps,
            AdviceTopic::Running,
            AdviceTopic::Water,
            AdviceTopic::Sleep,
            AdviceTopic::Gym,
            AdviceTopic::Food,
            AdviceTopic::Overview,
        ] {
            assert!(build_prompt(topic, &empty, None, utc(), today()).is_none());
        }
    }

    #[test]
    fn test_topic_parse() {
        assert_eq!("Run".parse::<AdviceTopic>().unwrap(), AdviceTopic::Running);
        assert!("yoga".parse::<AdviceTopic>().is_err());
    }
}
