//! Itinerary prompt construction and response formatting.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

use super::model::FinalizedPreferences;

/// System message sent with every itinerary request.
pub const SYSTEM_PROMPT: &str = "You are a world-class travel expert with extensive knowledge of \
destinations worldwide. Your recommendations are always personalized, practical, and inspiring, \
focusing on creating unforgettable travel experiences that perfectly match the traveler's \
preferences and requirements. Format your responses with clear sections and bold headers for \
better readability.";

const PROMPT_INTRO: &str = "You are a world traveler and an expert planner who knows every city \
and continent on earth very well. Based on the following travel preferences, please curate TWO \
different detailed travel plans that match the requirements perfectly. Format your response with \
clear sections and bold headers.";

const PLAN_TEMPLATE: &str = "\
For each travel plan, please structure the response as follows:

**Overview**
- Total Budget Breakdown
- Travel Timeframe
- Travel Style
- Destinations
- Key Interests

**Option 1: [Destination Name]**
**Why This Destination?**
[Explanation of why this matches preferences]

**Day-by-Day Itinerary**
For each day:
**Day X: [Title]**
**Morning:**
- Activities
- Recommendations
**Afternoon:**
- Activities
- Options
**Evening:**
- Dining
- Entertainment

**Accommodations**
- Recommended hotels/resorts
- Price ranges
- Location benefits

**Dining Experiences**
- Must-try dishes
- Restaurant recommendations
- Local food experiences

**Transportation**
- Getting around
- Cost estimates
- Time-saving tips

**Cultural & Practical Tips**
- Local customs
- Language basics
- Safety tips
- Packing essentials

**Unique Experiences**
- Hidden gems
- Special activities
- Photo opportunities

**Budget Breakdown**
- Detailed costs for all categories

[Repeat structure for Option 2]

Please ensure all recommendations are specific, practical, and align with the stated preferences and constraints.";

static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("bold pattern is valid"));
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[^>]+(>|$)").expect("tag pattern is valid"));

/// Build the user prompt for one itinerary request.
///
/// Deterministic for a given record. Optional fields only contribute a line
/// when present.
pub fn itinerary_prompt(prefs: &FinalizedPreferences) -> String {
    let mut prompt = String::with_capacity(4096);
    prompt.push_str(PROMPT_INTRO);
    prompt.push_str("\n\nTravel Profile:\n");

    let mut line = |label: &str, value: &str| {
        let _ = writeln!(prompt, "- {label}: {value}");
    };

    line("Purpose", &prefs.trip_purpose);
    line("Trip Length", &prefs.trip_length.to_string());
    if let Some(dates) = prefs.travel_dates.describe() {
        line("Travel Dates", &dates);
    }
    line("Preferred Regions", &prefs.preferred_regions.join(", "));
    line("Environment", prefs.environment_preference.as_str());
    line("Total Budget", &format!("${}", prefs.total_budget.normalize()));
    line(
        "Accommodation",
        &format!(
            "{} (${}/night)",
            prefs.accommodation_type,
            prefs.accommodation_budget.normalize()
        ),
    );
    line("Activities", &prefs.activities.join(", "));
    line("Cuisine Preferences", &prefs.cuisine_preferences.join(", "));
    line("Dining Budget", prefs.dining_budget.as_str());
    line("Travel Companions", prefs.travel_companions.as_str());
    line("Adventure Level", prefs.adventure_level.as_str());
    if !prefs.bucket_list_items.is_empty() {
        line("Bucket List", &prefs.bucket_list_items.join(", "));
    }
    line("Travel Pace", prefs.travel_pace.as_str());
    line("Transportation", prefs.transportation_preference.as_str());
    line("Experience Level", prefs.travel_experience_level.as_str());
    line("Comfort Level", prefs.comfort_level.as_str());
    if let Some(text) = &prefs.special_considerations {
        line("Special Considerations", text);
    }
    if let Some(text) = &prefs.health_safety_concerns {
        line("Health & Safety Concerns", text);
    }
    if let Some(text) = &prefs.previous_experiences {
        line("Previous Travel Experiences", text);
    }

    prompt.push('\n');
    prompt.push_str(PLAN_TEMPLATE);
    prompt
}

/// Escape markup in model output, then replace `**text**` spans with
/// `<strong>text</strong>`. The only tags in the result are the ones added here.
pub fn format_itinerary(raw: &str) -> String {
    let escaped = raw
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    BOLD.replace_all(&escaped, "<strong>$1</strong>").into_owned()
}

/// Strip inline tags and decode entities, leaving the text a user would copy.
pub fn to_plain_text(formatted: &str) -> String {
    TAG.replace_all(formatted, "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// `"$"` followed by the amount with comma thousands separators and at most
/// three fraction digits: `3000` → `"$3,000"`.
pub fn format_currency(amount: Decimal) -> String {
    let rounded = amount.abs().round_dp(3).normalize().to_string();
    let (int_part, frac_part) = match rounded.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (rounded.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount.is_sign_negative() && !amount.is_zero() {
        "-"
    } else {
        ""
    };
    match frac_part {
        Some(frac) => format!("{sign}${grouped}.{frac}"),
        None => format!("{sign}${grouped}"),
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::questionnaire::model::fixtures::finalized;
    use crate::questionnaire::model::TripLength;

    #[test]
    fn prompt_lists_profile() {
        let prompt = itinerary_prompt(&finalized());
        assert!(prompt.starts_with("You are a world traveler"));
        assert!(prompt.contains("- Purpose: relaxation\n"));
        assert!(prompt.contains("- Trip Length: short\n"));
        assert!(prompt.contains("- Preferred Regions: Caribbean\n"));
        assert!(prompt.contains("- Environment: coastal\n"));
        assert!(prompt.contains("- Total Budget: $3000\n"));
        assert!(prompt.contains("- Accommodation: mid-range ($150/night)\n"));
        assert!(prompt.contains("- Travel Companions: couple\n"));
        assert!(prompt.contains("- Comfort Level: moderate\n"));
        assert!(prompt.contains("**Option 1: [Destination Name]**"));
        assert!(prompt.contains("[Repeat structure for Option 2]"));
    }

    #[test]
    fn prompt_omits_absent_optional_lines() {
        let prompt = itinerary_prompt(&finalized());
        assert!(!prompt.contains("Special Considerations"));
        assert!(!prompt.contains("Health & Safety Concerns"));
        assert!(!prompt.contains("Previous Travel Experiences"));
        assert!(!prompt.contains("Travel Dates"));
    }

    #[test]
    fn prompt_includes_present_optional_lines() {
        let mut prefs = finalized();
        prefs.special_considerations = Some("Wheelchair access".into());
        prefs.health_safety_concerns = Some("Peanut allergy".into());
        prefs.trip_length = TripLength::Days(5);
        let prompt = itinerary_prompt(&prefs);
        assert!(prompt.contains("- Special Considerations: Wheelchair access\n"));
        assert!(prompt.contains("- Health & Safety Concerns: Peanut allergy\n"));
        assert!(prompt.contains("- Trip Length: 5 days\n"));
    }

    #[test]
    fn prompt_is_deterministic() {
        let prefs = finalized();
        assert_eq!(itinerary_prompt(&prefs), itinerary_prompt(&prefs));
    }

    #[test]
    fn bold_markers_become_strong_tags() {
        let raw = "**Option 1: Barbados**\nRelax on **Carlisle Bay**.\nNo ** close";
        let formatted = format_itinerary(raw);
        assert_eq!(
            formatted,
            "<strong>Option 1: Barbados</strong>\nRelax on <strong>Carlisle Bay</strong>.\nNo ** close"
        );
    }

    #[test]
    fn markup_in_model_output_is_escaped() {
        let raw = "**Day 1** <script>alert(1)</script> & <img src=x onerror=y>";
        let formatted = format_itinerary(raw);
        assert_eq!(
            formatted,
            "<strong>Day 1</strong> &lt;script&gt;alert(1)&lt;/script&gt; &amp; &lt;img src=x onerror=y&gt;"
        );
        assert_eq!(to_plain_text(&formatted), "Day 1 <script>alert(1)</script> & <img src=x onerror=y>");

        assert_eq!(to_plain_text(&format_itinerary("Fish &amp; chips")), "Fish &amp; chips");
    }

    #[test]
    fn plain_text_strips_tags() {
        let formatted = "<strong>Day 1</strong>\n- Beach <em>time</em>";
        assert_eq!(to_plain_text(formatted), "Day 1\n- Beach time");
        assert_eq!(to_plain_text("trailing <br"), "trailing ");
    }

    #[test]
    fn currency_grouping() {
        assert_eq!(format_currency(dec!(3000)), "$3,000");
        assert_eq!(format_currency(dec!(999)), "$999");
        assert_eq!(format_currency(dec!(1234567.5)), "$1,234,567.5");
        assert_eq!(format_currency(dec!(1000.1256)), "$1,000.126");
        assert_eq!(format_currency(dec!(2500.00)), "$2,500");
        assert_eq!(format_currency(Decimal::ZERO), "$0");
    }
}
