//! Conversation scripts and input parsing.
//!
//! Each collection state has a fixed, ordered list of questions. The cursor
//! is derived from the draft itself (the current question is the first one
//! whose field has not been answered), so a reloaded session always resumes
//! at exactly the right point and nothing stale is carried over.

use chrono::{Duration, NaiveDate};
use regex::Regex;
use rust_decimal::Decimal;

use crate::draft::{
    ClaimDraft, InjurySeverity, LossType, ThirdParty, TreatmentLevel, Vehicle,
};
use crate::session::{FnolState, InputKind, InputOption, PendingInput, ProductLine};
use crate::validation::subtype_required;
use uuid::Uuid;

/// A single question in a state's script.
#[derive(Debug, Clone)]
pub struct Question {
    pub field: &'static str,
    pub prompt: String,
    pub input: PendingInput,
}

/// Outcome of merging an answer into the draft.
#[derive(Debug, Clone)]
pub enum AnswerEffect {
    Recorded,
    /// The answer revealed an emergency; the machine escalates immediately.
    Emergency { reason: String },
}

pub type AnswerResult = std::result::Result<AnswerEffect, Vec<String>>;

// ---------------------------------------------------------------------------
// Question scripts
// ---------------------------------------------------------------------------

/// The next unanswered question for the current state, or `None` when the
/// state's collection is complete.
pub fn next_question(state: FnolState, draft: &ClaimDraft, line: ProductLine) -> Option<Question> {
    match state {
        FnolState::SafetyCheck => safety_question(draft),
        FnolState::IdentityMatch => identity_question(draft),
        FnolState::IncidentCore => incident_question(draft, line),
        FnolState::VehicleDriver => vehicle_question(draft),
        FnolState::ThirdParties => third_party_question(draft),
        FnolState::Injuries => injury_question(draft),
        FnolState::DamageEvidence => damage_question(draft, line),
        _ => None,
    }
}

/// Direct lookup used when the reconciliation protocol routes back to
/// re-ask a specific field.
pub fn question_for_field(
    field: &str,
    draft: &ClaimDraft,
    line: ProductLine,
) -> Option<Question> {
    match field {
        "incident_date" => Some(incident_date_question()),
        "incident_location" => Some(incident_location_question()),
        "estimated_damage" => Some(estimated_damage_question()),
        _ => next_question_owner(field, draft, line),
    }
}

fn next_question_owner(
    field: &str,
    draft: &ClaimDraft,
    line: ProductLine,
) -> Option<Question> {
    for state in crate::session::STATE_ORDER {
        if let Some(q) = next_question(state, draft, line) {
            if q.field == field {
                return Some(q);
            }
        }
    }
    None
}

fn safety_question(draft: &ClaimDraft) -> Option<Question> {
    match draft.safety.confirmed_safe {
        None => Some(Question {
            field: "safety_confirmed",
            prompt: "Before we begin, I need to make sure everyone is safe. Are you and \
                     everyone involved currently in a safe location?"
                .into(),
            input: PendingInput::yes_no(vec![
                InputOption::new("yes", "Yes, we're safe"),
                InputOption::new("no", "No, I need help"),
            ]),
        }),
        Some(false) => Some(Question {
            field: "safety_retry",
            prompt: "Your safety is the priority. If you're in immediate danger, call 911 \
                     and move to a safe location away from traffic. Let me know once you're \
                     in a safe place and we can continue."
                .into(),
            input: PendingInput::yes_no(vec![
                InputOption::new("yes", "I'm now in a safe location"),
                InputOption::new("help", "I need emergency assistance"),
            ]),
        }),
        Some(true) => match draft.safety.anyone_injured {
            None => Some(Question {
                field: "anyone_injured",
                prompt: "Good to hear you're safe. Is anyone injured or in need of immediate \
                         medical attention?"
                    .into(),
                input: PendingInput::yes_no(vec![
                    InputOption::new("no", "No, no one is injured"),
                    InputOption::new("yes", "Yes, someone is injured"),
                    InputOption::new("unsure", "I'm not sure"),
                ]),
            }),
            Some(_) => None,
        },
    }
}

fn identity_question(draft: &ClaimDraft) -> Option<Question> {
    use crate::draft::IdentityStatus;
    match draft.identity.status {
        IdentityStatus::Pending => Some(Question {
            field: "policy_number",
            prompt: "What is your policy number? If you don't have it handy, you can \
                     continue as a guest and we'll match your policy later."
                .into(),
            input: PendingInput::text(),
        }),
        _ => None,
    }
}

fn loss_type_options(line: ProductLine) -> Vec<InputOption> {
    match line {
        ProductLine::Auto => vec![
            InputOption::new("collision", "Collision/Accident"),
            InputOption::new("theft", "Theft"),
            InputOption::new("weather", "Weather damage"),
            InputOption::new("vandalism", "Vandalism"),
            InputOption::new("glass", "Glass only"),
            InputOption::new("fire", "Fire"),
            InputOption::new("other", "Something else"),
        ],
        ProductLine::Home => vec![
            InputOption::new("fire", "Fire or smoke"),
            InputOption::new("water", "Water damage"),
            InputOption::new("theft", "Theft or break-in"),
            InputOption::new("weather", "Weather damage"),
            InputOption::new("vandalism", "Vandalism"),
            InputOption::new("other", "Something else"),
        ],
    }
}

fn subtype_question(loss_type: LossType, line: ProductLine) -> Question {
    let (prompt, options) = match (loss_type, line) {
        (LossType::Collision, _) => (
            "How many vehicles were involved in this collision?",
            vec![
                InputOption::new("single_vehicle", "Just my vehicle"),
                InputOption::new("two_vehicle", "Two vehicles"),
                InputOption::new("multi_vehicle", "Three or more vehicles"),
            ],
        ),
        (LossType::Weather, _) => (
            "What type of weather damage occurred?",
            vec![
                InputOption::new("hail", "Hail"),
                InputOption::new("flood", "Flood/Water"),
                InputOption::new("wind", "Wind"),
                InputOption::new("tree", "Fallen tree or branch"),
            ],
        ),
        (LossType::Theft, ProductLine::Auto) => (
            "Was the vehicle stolen, or were items taken from it?",
            vec![
                InputOption::new("vehicle_stolen", "Vehicle was stolen"),
                InputOption::new("attempted_theft", "Attempted theft"),
                InputOption::new("items_stolen", "Items stolen from the vehicle"),
            ],
        ),
        (LossType::Theft, ProductLine::Home) => (
            "Was there a break-in, or were items taken?",
            vec![
                InputOption::new("break_in", "Break-in"),
                InputOption::new("items_stolen", "Items stolen"),
                InputOption::new("attempted_theft", "Attempted theft"),
            ],
        ),
        _ => ("Can you tell us a bit more about what happened?", vec![]),
    };
    Question {
        field: "loss_subtype",
        prompt: prompt.into(),
        input: if options.is_empty() {
            PendingInput::text()
        } else {
            PendingInput::select(options)
        },
    }
}

fn incident_date_question() -> Question {
    Question {
        field: "incident_date",
        prompt: "When did the incident occur? Please provide the date.".into(),
        input: PendingInput {
            kind: InputKind::Date,
            options: Vec::new(),
            allow_skip: false,
        },
    }
}

fn incident_location_question() -> Question {
    Question {
        field: "incident_location",
        prompt: "Where did the incident occur? Please provide the address or describe the \
                 location."
            .into(),
        input: PendingInput::text(),
    }
}

fn estimated_damage_question() -> Question {
    Question {
        field: "estimated_damage",
        prompt: "What is your estimate of the damage amount, in dollars?".into(),
        input: PendingInput::text(),
    }
}

fn incident_question(draft: &ClaimDraft, line: ProductLine) -> Option<Question> {
    let incident = &draft.incident;
    let Some(loss_type) = incident.loss_type else {
        return Some(Question {
            field: "loss_type",
            prompt: "What type of incident are you reporting?".into(),
            input: PendingInput::select(loss_type_options(line)),
        });
    };
    if subtype_required(loss_type) && incident.loss_subtype.is_none() {
        return Some(subtype_question(loss_type, line));
    }
    if incident.date.is_none() {
        return Some(incident_date_question());
    }
    if !incident.time_recorded {
        return Some(Question {
            field: "incident_time",
            prompt: "What time did it happen? An approximate time is fine, or say \"skip\" \
                     if you're not sure."
                .into(),
            input: PendingInput {
                kind: InputKind::Time,
                options: Vec::new(),
                allow_skip: true,
            },
        });
    }
    if incident.location_raw.is_none() {
        return Some(incident_location_question());
    }
    if incident.description.is_none() {
        return Some(Question {
            field: "incident_description",
            prompt: "Please describe what happened in your own words, with as much detail \
                     as you can remember."
                .into(),
            input: PendingInput::text(),
        });
    }
    None
}

fn vehicle_question(draft: &ClaimDraft) -> Option<Question> {
    let Some(vehicle) = draft.insured_vehicle() else {
        return Some(Question {
            field: "vehicle_description",
            prompt: "Which vehicle was involved? Please give the year, make and model."
                .into(),
            input: PendingInput::text(),
        });
    };
    if vehicle.drivable.is_none() {
        return Some(Question {
            field: "vehicle_drivable",
            prompt: "Is the vehicle currently drivable?".into(),
            input: PendingInput::yes_no(vec![
                InputOption::new("yes", "Yes, it's drivable"),
                InputOption::new("no", "No, it can't be driven"),
            ]),
        });
    }
    if vehicle.drivable == Some(false) && vehicle.tow_needed.is_none() {
        return Some(Question {
            field: "tow_needed",
            prompt: "Do you need us to arrange a tow?".into(),
            input: PendingInput::yes_no(vec![
                InputOption::new("yes", "Yes, please arrange a tow"),
                InputOption::new("no", "No, it's been handled"),
            ]),
        });
    }
    None
}

fn third_party_question(draft: &ClaimDraft) -> Option<Question> {
    match draft.third_parties.other_party_involved {
        None => Some(Question {
            field: "other_party_involved",
            prompt: "Was another driver or vehicle involved?".into(),
            input: PendingInput::select(vec![
                InputOption::new("yes", "Yes, and I have their information"),
                InputOption::new("left", "Yes, but they left the scene"),
                InputOption::new("no", "No other party involved"),
            ]),
        }),
        Some(true) if draft.third_parties.parties.is_empty() => Some(Question {
            field: "other_party_details",
            prompt: "Please share what you have about the other party: name, phone, and \
                     their insurance carrier if you got it."
                .into(),
            input: PendingInput::text(),
        }),
        _ => None,
    }
}

fn injury_question(draft: &ClaimDraft) -> Option<Question> {
    let Some(severity) = draft.injuries.reported_severity else {
        return Some(Question {
            field: "injury_severity",
            prompt: "Now that we've covered the incident, was anyone injured? If so, how \
                     serious are the injuries?"
                .into(),
            input: PendingInput::select(vec![
                InputOption::new("none", "No injuries"),
                InputOption::new("minor", "Minor (bruises, small cuts)"),
                InputOption::new("moderate", "Moderate (needed medical care)"),
                InputOption::new("severe", "Severe"),
                InputOption::new("fatal", "Fatal"),
            ]),
        });
    };
    if severity != InjurySeverity::None && draft.injuries.treatment.is_none() {
        return Some(Question {
            field: "treatment_level",
            prompt: "What level of treatment was needed?".into(),
            input: PendingInput::select(vec![
                InputOption::new("none", "None"),
                InputOption::new("onsite", "Treated at the scene"),
                InputOption::new("urgent_care", "Urgent care visit"),
                InputOption::new("er", "Emergency room"),
                InputOption::new("admitted", "Admitted to hospital"),
            ]),
        });
    }
    None
}

fn damage_area_options(line: ProductLine) -> Vec<InputOption> {
    match line {
        ProductLine::Auto => vec![
            InputOption::new("front", "Front"),
            InputOption::new("rear", "Rear"),
            InputOption::new("left_side", "Left/Driver side"),
            InputOption::new("right_side", "Right/Passenger side"),
            InputOption::new("roof", "Roof"),
            InputOption::new("windshield", "Windshield"),
            InputOption::new("hood", "Hood"),
            InputOption::new("trunk", "Trunk"),
            InputOption::new("total", "All over/possible total loss"),
        ],
        ProductLine::Home => vec![
            InputOption::new("roof", "Roof"),
            InputOption::new("walls", "Walls"),
            InputOption::new("windows", "Windows"),
            InputOption::new("kitchen", "Kitchen"),
            InputOption::new("bathroom", "Bathroom"),
            InputOption::new("basement", "Basement"),
            InputOption::new("exterior", "Exterior"),
            InputOption::new("other", "Other"),
        ],
    }
}

fn damage_question(draft: &ClaimDraft, line: ProductLine) -> Option<Question> {
    if draft.damage.areas.is_empty() {
        let subject = match line {
            ProductLine::Auto => "the vehicle",
            ProductLine::Home => "your home",
        };
        return Some(Question {
            field: "damage_areas",
            prompt: format!(
                "Which areas of {subject} were damaged? You can select more than one."
            ),
            input: PendingInput {
                kind: InputKind::MultiSelect,
                options: damage_area_options(line),
                allow_skip: false,
            },
        });
    }
    if draft.damage.description.is_none() {
        return Some(Question {
            field: "damage_description",
            prompt: "Please describe the damage in more detail.".into(),
            input: PendingInput::text(),
        });
    }
    if draft.damage.estimated_amount.is_none() {
        return Some(estimated_damage_question());
    }
    if !draft.has_damage_photo() {
        return Some(Question {
            field: "damage_photo",
            prompt: "Photos help us process your claim faster, and at least one photo of \
                     the damage is required. Please upload a photo now. If you have a \
                     police report you can upload that too, but it's optional."
                .into(),
            input: PendingInput {
                kind: InputKind::Photo,
                options: Vec::new(),
                allow_skip: false,
            },
        });
    }
    None
}

// ---------------------------------------------------------------------------
// Answer parsing and merging
// ---------------------------------------------------------------------------

/// Parse and merge one answer into the draft. Per-question parse failures
/// come back as user-facing messages; the caller discards the draft clone in
/// that case so nothing is mutated.
pub fn apply_answer(
    draft: &mut ClaimDraft,
    line: ProductLine,
    field: &str,
    text: &str,
    today: NaiveDate,
) -> AnswerResult {
    let text = text.trim();
    match field {
        "safety_confirmed" => match parse_yes_no(text) {
            Some(true) => {
                draft.safety.confirmed_safe = Some(true);
                Ok(AnswerEffect::Recorded)
            }
            Some(false) => {
                draft.safety.confirmed_safe = Some(false);
                Ok(AnswerEffect::Recorded)
            }
            None => Err(vec![
                "Please let us know whether you're in a safe location".to_string(),
            ]),
        },
        "safety_retry" => {
            if contains_emergency_keyword(text) {
                draft.safety.emergency_detected = true;
                draft.safety.emergency_kind = Some("caller_unsafe".into());
                return Ok(AnswerEffect::Emergency {
                    reason: "Caller reported being in an unsafe situation".into(),
                });
            }
            match parse_yes_no(text) {
                Some(true) => {
                    draft.safety.confirmed_safe = Some(true);
                    Ok(AnswerEffect::Recorded)
                }
                _ => Ok(AnswerEffect::Recorded),
            }
        }
        "anyone_injured" => {
            let (has_injury, severe) = parse_injury_response(text);
            if severe {
                draft.safety.anyone_injured = Some(true);
                draft.safety.emergency_detected = true;
                draft.safety.emergency_kind = Some("severe_injury".into());
                return Ok(AnswerEffect::Emergency {
                    reason: "Severe injury reported during the safety check".into(),
                });
            }
            match has_injury {
                Some(answer) => {
                    draft.safety.anyone_injured = Some(answer);
                    Ok(AnswerEffect::Recorded)
                }
                None => Err(vec![
                    "Please let us know whether anyone is injured".to_string()
                ]),
            }
        }
        "policy_number" => {
            if text.is_empty() {
                return Err(vec!["Please enter your policy number, or say \"guest\"".into()]);
            }
            draft.identity.policy_number = Some(text.to_string());
            Ok(AnswerEffect::Recorded)
        }
        "loss_type" => match LossType::from_text(text) {
            Some(loss_type) => {
                draft.incident.loss_type = Some(loss_type);
                Ok(AnswerEffect::Recorded)
            }
            None => Err(vec!["Please select the type of incident".to_string()]),
        },
        "loss_subtype" => {
            let loss_type = draft.incident.loss_type;
            match parse_subtype(text, loss_type, line) {
                Some(subtype) => {
                    draft.incident.loss_subtype = Some(subtype);
                    Ok(AnswerEffect::Recorded)
                }
                None => Err(vec!["Please pick one of the listed options".to_string()]),
            }
        }
        "incident_date" => match parse_date(text, today) {
            Some((date, _approximate)) if date <= today => {
                draft.incident.date = Some(date);
                Ok(AnswerEffect::Recorded)
            }
            Some(_) => Err(vec!["The date cannot be in the future".to_string()]),
            None => Err(vec![
                "I couldn't understand that date. Try a format like 01/15/2026".to_string(),
            ]),
        },
        "incident_time" => {
            if is_skip(text) {
                draft.incident.time = None;
                draft.incident.time_approximate = true;
            } else if let Some((time, approximate)) = parse_time(text) {
                draft.incident.time = Some(time);
                draft.incident.time_approximate = approximate;
            } else {
                draft.incident.time = None;
                draft.incident.time_approximate = true;
            }
            draft.incident.time_recorded = true;
            Ok(AnswerEffect::Recorded)
        }
        "incident_location" => {
            if text.len() < crate::validation::MIN_LOCATION_LEN {
                return Err(vec![
                    "Please provide a more specific location (street, intersection or \
                     landmark)"
                        .to_string(),
                ]);
            }
            draft.incident.location_raw = Some(text.to_string());
            draft.incident.location_normalized = Some(text.to_lowercase());
            Ok(AnswerEffect::Recorded)
        }
        "incident_description" => {
            if text.len() < crate::validation::MIN_DESCRIPTION_LEN {
                return Err(vec![
                    "Please provide a bit more detail about what happened".to_string(),
                ]);
            }
            draft.incident.description = Some(text.to_string());
            Ok(AnswerEffect::Recorded)
        }
        "vehicle_description" => {
            if text.len() < 3 {
                return Err(vec!["Please describe the vehicle".to_string()]);
            }
            let year = parse_vehicle_year(text);
            draft.vehicles.push(Vehicle::insured(text.to_string(), year));
            Ok(AnswerEffect::Recorded)
        }
        "vehicle_drivable" => match parse_yes_no(text) {
            Some(answer) => {
                if let Some(vehicle) = draft.insured_vehicle_mut() {
                    vehicle.drivable = Some(answer);
                }
                Ok(AnswerEffect::Recorded)
            }
            None => Err(vec![
                "Please let us know whether the vehicle is drivable".to_string(),
            ]),
        },
        "tow_needed" => match parse_yes_no(text) {
            Some(answer) => {
                if let Some(vehicle) = draft.insured_vehicle_mut() {
                    vehicle.tow_needed = Some(answer);
                }
                Ok(AnswerEffect::Recorded)
            }
            None => Err(vec!["Please answer yes or no".to_string()]),
        },
        "other_party_involved" => {
            let lower = text.to_lowercase();
            if lower.contains("left") || lower.contains("ran") || lower.contains("hit and run") {
                draft.third_parties.other_party_involved = Some(true);
                draft.third_parties.parties.push(ThirdParty {
                    party_id: Uuid::new_v4(),
                    details: None,
                    is_unknown: true,
                });
                draft.add_scenario("hit_and_run");
                return Ok(AnswerEffect::Recorded);
            }
            match parse_yes_no(text) {
                Some(answer) => {
                    draft.third_parties.other_party_involved = Some(answer);
                    Ok(AnswerEffect::Recorded)
                }
                None => Err(vec![
                    "Please let us know whether another party was involved".to_string(),
                ]),
            }
        }
        "other_party_details" => {
            if text.len() < 3 {
                return Err(vec![
                    "Please share what you have about the other party".to_string(),
                ]);
            }
            draft.third_parties.parties.push(ThirdParty {
                party_id: Uuid::new_v4(),
                details: Some(text.to_string()),
                is_unknown: false,
            });
            Ok(AnswerEffect::Recorded)
        }
        "injury_severity" => match parse_severity(text) {
            Some(severity) => {
                draft.injuries.reported_severity = Some(severity);
                if severity != InjurySeverity::None {
                    draft.injuries.injuries.push(crate::draft::Injury {
                        injury_id: Uuid::new_v4(),
                        severity,
                        treatment_level: None,
                    });
                }
                if severity.requires_emergency_handling() {
                    return Ok(AnswerEffect::Emergency {
                        reason: format!("{} injury reported", severity.as_str()),
                    });
                }
                Ok(AnswerEffect::Recorded)
            }
            None => Err(vec!["Please pick one of the injury options".to_string()]),
        },
        "treatment_level" => match parse_treatment(text) {
            Some(level) => {
                draft.injuries.treatment = Some(level);
                if let Some(injury) = draft.injuries.injuries.last_mut() {
                    injury.treatment_level = Some(level);
                }
                if level == TreatmentLevel::Admitted {
                    return Ok(AnswerEffect::Emergency {
                        reason: "Hospital admission reported".into(),
                    });
                }
                Ok(AnswerEffect::Recorded)
            }
            None => Err(vec!["Please pick one of the treatment options".to_string()]),
        },
        "damage_areas" => {
            let areas = parse_damage_areas(text, line);
            if areas.is_empty() {
                return Err(vec![
                    "Please select or describe which areas were damaged".to_string(),
                ]);
            }
            draft.damage.areas = areas;
            Ok(AnswerEffect::Recorded)
        }
        "damage_description" => {
            if text.is_empty() {
                return Err(vec!["Please describe the damage".to_string()]);
            }
            draft.damage.description = Some(text.to_string());
            Ok(AnswerEffect::Recorded)
        }
        "estimated_damage" => match parse_amount(text) {
            Some(amount) if amount >= Decimal::ZERO => {
                draft.damage.estimated_amount = Some(amount);
                Ok(AnswerEffect::Recorded)
            }
            _ => Err(vec![
                "Please enter the estimated amount in dollars, for example 3000".to_string(),
            ]),
        },
        "damage_photo" => Err(vec![
            "A photo of the damage is required before we can continue. Please upload one."
                .to_string(),
        ]),
        _ => Err(vec!["I didn't understand that answer".to_string()]),
    }
}

// ---------------------------------------------------------------------------
// Free-text parsers
// ---------------------------------------------------------------------------

pub fn parse_yes_no(text: &str) -> Option<bool> {
    let t = text.to_lowercase();
    let t = t.trim();
    let yes = Regex::new(
        r"^(y(es)?|yeah?|yep|yup|sure|ok(ay)?|affirmative|correct|right|safe|we'?re safe|i'?m safe|all safe)$",
    )
    .unwrap();
    let no = Regex::new(r"^(no?|nope|nah|negative|not (yet|now|really|safe)|unsafe|help|need help|emergency)$")
        .unwrap();
    if yes.is_match(t) {
        return Some(true);
    }
    if no.is_match(t) {
        return Some(false);
    }
    if ["yes", "safe", "okay", "fine", "good"].iter().any(|w| t.contains(w)) {
        return Some(true);
    }
    if ["no", "not safe", "help", "emergency", "danger"].iter().any(|w| t.contains(w)) {
        return Some(false);
    }
    None
}

fn contains_emergency_keyword(text: &str) -> bool {
    let t = text.to_lowercase();
    ["help", "emergency", "ambulance", "911", "danger", "stuck"]
        .iter()
        .any(|kw| t.contains(kw))
}

/// Returns (has_injury, severe). Unsure answers count as an injury, severe
/// keywords trip the emergency path.
pub fn parse_injury_response(text: &str) -> (Option<bool>, bool) {
    let t = text.to_lowercase();
    let severe_keywords = [
        "ambulance",
        "hospital",
        "unconscious",
        "bleeding heavily",
        "can't breathe",
        "chest pain",
        "fatal",
    ];
    if severe_keywords.iter().any(|kw| t.contains(kw)) {
        return (Some(true), true);
    }
    let injury_keywords = ["hurt", "injured", "pain", "bleeding", "broken", "whiplash"];
    if injury_keywords.iter().any(|kw| t.contains(kw)) && !t.contains("no one") && !t.contains("not ")
    {
        return (Some(true), false);
    }
    let no_patterns = [
        "no one", "nobody", "no injuries", "everyone is fine", "not hurt", "not injured", "none",
    ];
    if no_patterns.iter().any(|p| t.contains(p)) || t.trim() == "no" {
        return (Some(false), false);
    }
    let unsure = ["unsure", "not sure", "don't know", "maybe", "possibly"];
    if unsure.iter().any(|p| t.contains(p)) {
        return (Some(true), false);
    }
    match parse_yes_no(&t) {
        Some(answer) => (Some(answer), false),
        None => (None, false),
    }
}

pub fn is_skip(text: &str) -> bool {
    let t = text.to_lowercase();
    let t = t.trim();
    matches!(t, "skip" | "not sure" | "don't know" | "dont know" | "unknown" | "i don't know")
}

pub fn parse_date(text: &str, today: NaiveDate) -> Option<(NaiveDate, bool)> {
    let t = text.to_lowercase();
    let t = t.trim();
    let approximate = ["around", "about", "approximately"].iter().any(|w| t.contains(w));

    if t.contains("today") {
        return Some((today, false));
    }
    if t.contains("yesterday") || t.contains("last night") {
        return Some((today - Duration::days(1), t.contains("last night")));
    }

    let cleaned = Regex::new(r"^(around|about|approximately|on)\s+")
        .unwrap()
        .replace(t, "")
        .trim()
        .to_string();

    const FORMATS: &[&str] = &[
        "%m/%d/%Y", "%m-%d-%Y", "%m/%d/%y", "%Y-%m-%d", "%Y/%m/%d", "%B %d, %Y", "%B %d %Y",
        "%b %d, %Y", "%b %d %Y", "%d %B %Y", "%d %b %Y",
    ];
    for format in FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&cleaned, format) {
            return Some((date, approximate));
        }
    }
    None
}

pub fn parse_time(text: &str) -> Option<(String, bool)> {
    let t = text.to_lowercase();
    let approximate = ["around", "about", "approximately", "roughly", "ish"]
        .iter()
        .any(|w| t.contains(w));

    let descriptions = [
        ("morning", "09:00"),
        ("afternoon", "14:00"),
        ("evening", "18:00"),
        ("midnight", "00:00"),
        ("night", "21:00"),
        ("noon", "12:00"),
        ("midday", "12:00"),
    ];
    for (description, time) in descriptions {
        if t.contains(description) {
            return Some((time.to_string(), true));
        }
    }

    let re = Regex::new(r"(\d{1,2})(?::(\d{2}))?\s*(am|pm|a\.m\.|p\.m\.)?").unwrap();
    let captures = re.captures(&t)?;
    let mut hour: u32 = captures.get(1)?.as_str().parse().ok()?;
    let minute: u32 = captures
        .get(2)
        .map(|m| m.as_str().parse().unwrap_or(0))
        .unwrap_or(0);
    if let Some(period) = captures.get(3) {
        let period = period.as_str();
        if period.starts_with('p') && hour < 12 {
            hour += 12;
        } else if period.starts_with('a') && hour == 12 {
            hour = 0;
        }
    }
    if hour <= 23 && minute <= 59 {
        Some((format!("{hour:02}:{minute:02}"), approximate))
    } else {
        None
    }
}

pub fn parse_amount(text: &str) -> Option<Decimal> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

pub fn parse_severity(text: &str) -> Option<InjurySeverity> {
    let t = text.to_lowercase();
    let t = t.trim();
    if t.contains("fatal") {
        return Some(InjurySeverity::Fatal);
    }
    if t.contains("severe") || t.contains("serious") {
        return Some(InjurySeverity::Severe);
    }
    if t.contains("moderate") {
        return Some(InjurySeverity::Moderate);
    }
    if t.contains("minor") || t.contains("bruise") || t.contains("small cut") {
        return Some(InjurySeverity::Minor);
    }
    if t.contains("none") || t.contains("no injur") || t.contains("no one") || t == "no" {
        return Some(InjurySeverity::None);
    }
    if t.contains("unknown") || t.contains("not sure") {
        return Some(InjurySeverity::Unknown);
    }
    None
}

pub fn parse_treatment(text: &str) -> Option<TreatmentLevel> {
    let t = text.to_lowercase();
    let t = t.trim();
    if t.contains("admitted") || t.contains("hospital") {
        return Some(TreatmentLevel::Admitted);
    }
    if t == "er" || t.contains("emergency room") {
        return Some(TreatmentLevel::Er);
    }
    if t.contains("urgent") {
        return Some(TreatmentLevel::UrgentCare);
    }
    if t.contains("scene") || t.contains("onsite") || t.contains("on-site") {
        return Some(TreatmentLevel::Onsite);
    }
    if t.contains("none") || t == "no" {
        return Some(TreatmentLevel::None);
    }
    None
}

fn parse_vehicle_year(text: &str) -> Option<u16> {
    let re = Regex::new(r"\b(19|20)\d{2}\b").unwrap();
    re.find(text)?.as_str().parse().ok()
}

fn parse_subtype(text: &str, loss_type: Option<LossType>, line: ProductLine) -> Option<String> {
    let t = text.to_lowercase();
    let candidates: &[(&str, &[&str])] = match (loss_type, line) {
        (Some(LossType::Collision), _) => &[
            ("single_vehicle", &["single", "just my", "only my", "1"]),
            ("two_vehicle", &["two", "2", "other car", "another"]),
            ("multi_vehicle", &["three", "3", "more", "multi", "pile"]),
        ],
        (Some(LossType::Weather), _) => &[
            ("hail", &["hail"]),
            ("flood", &["flood", "water"]),
            ("wind", &["wind"]),
            ("tree", &["tree", "branch"]),
        ],
        (Some(LossType::Theft), ProductLine::Auto) => &[
            ("vehicle_stolen", &["vehicle", "car", "stolen"]),
            ("attempted_theft", &["attempt"]),
            ("items_stolen", &["item", "from"]),
        ],
        (Some(LossType::Theft), ProductLine::Home) => &[
            ("break_in", &["break", "broke"]),
            ("items_stolen", &["item", "stolen", "taken"]),
            ("attempted_theft", &["attempt"]),
        ],
        _ => return Some(t.trim().to_string()).filter(|s| !s.is_empty()),
    };
    for (value, keywords) in candidates {
        if t.contains(value) || keywords.iter().any(|kw| t.contains(kw)) {
            return Some((*value).to_string());
        }
    }
    None
}

pub fn parse_damage_areas(text: &str, line: ProductLine) -> Vec<String> {
    let t = text.to_lowercase();
    let keywords: &[(&str, &[&str])] = match line {
        ProductLine::Auto => &[
            ("front", &["front", "bumper", "grille", "headlight"]),
            ("rear", &["rear", "back", "taillight"]),
            ("left_side", &["left", "driver"]),
            ("right_side", &["right", "passenger"]),
            ("roof", &["roof", "top"]),
            ("windshield", &["windshield", "front glass"]),
            ("hood", &["hood"]),
            ("trunk", &["trunk", "hatch"]),
            ("total", &["total", "totaled", "all over", "everywhere"]),
        ],
        ProductLine::Home => &[
            ("roof", &["roof"]),
            ("walls", &["wall"]),
            ("windows", &["window"]),
            ("kitchen", &["kitchen"]),
            ("bathroom", &["bathroom", "bath"]),
            ("basement", &["basement"]),
            ("exterior", &["exterior", "outside", "siding", "fence"]),
        ],
    };
    let mut areas = Vec::new();
    for (area, words) in keywords {
        if words.iter().any(|w| t.contains(w)) {
            areas.push((*area).to_string());
        }
    }
    if areas.is_empty() && t.trim().len() > 2 {
        areas.push("other".to_string());
    }
    areas
}

/// Scenario tags derived from the collected incident facts, in the spirit of
/// the loss-module playbooks: they feed routing conditions and the summary.
pub fn detect_scenarios(draft: &ClaimDraft) -> Vec<String> {
    let mut scenarios = Vec::new();
    match draft.incident.loss_type {
        Some(LossType::Glass) => scenarios.push("glass_only".to_string()),
        Some(LossType::Theft) => scenarios.push("vehicle_theft".to_string()),
        _ => {}
    }
    if let Some(subtype) = draft.incident.loss_subtype.as_deref() {
        match subtype {
            "single_vehicle" => scenarios.push("single_vehicle".to_string()),
            "multi_vehicle" => scenarios.push("multi_vehicle".to_string()),
            "hail" | "flood" | "wind" | "tree" => scenarios.push(format!("weather_{subtype}")),
            _ => {}
        }
    }
    if draft.has_scenario("hit_and_run") {
        scenarios.push("hit_and_run".to_string());
    }
    scenarios
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
    }

    #[test]
    fn yes_no_variants() {
        assert_eq!(parse_yes_no("Yes"), Some(true));
        assert_eq!(parse_yes_no("yep"), Some(true));
        assert_eq!(parse_yes_no("we're safe"), Some(true));
        assert_eq!(parse_yes_no("no"), Some(false));
        assert_eq!(parse_yes_no("need help"), Some(false));
        assert_eq!(parse_yes_no("banana"), None);
    }

    #[test]
    fn date_formats_and_relative_dates() {
        assert_eq!(
            parse_date("01/15/2026", today()),
            Some((NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(), false))
        );
        assert_eq!(
            parse_date("January 15, 2026", today()),
            Some((NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(), false))
        );
        assert_eq!(parse_date("today", today()), Some((today(), false)));
        assert_eq!(
            parse_date("yesterday", today()),
            Some((today() - Duration::days(1), false))
        );
        let (date, approximate) = parse_date("around 2026-05-20", today()).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 5, 20).unwrap());
        assert!(approximate);
        assert_eq!(parse_date("not a date", today()), None);
    }

    #[test]
    fn time_parsing() {
        assert_eq!(parse_time("3pm"), Some(("15:00".into(), false)));
        assert_eq!(parse_time("around 8:30 am"), Some(("08:30".into(), true)));
        assert_eq!(parse_time("evening"), Some(("18:00".into(), true)));
    }

    #[test]
    fn amount_parsing_strips_currency_formatting() {
        assert_eq!(parse_amount("$3,000"), Some(Decimal::from(3000)));
        assert_eq!(parse_amount("3000.50"), Some("3000.50".parse().unwrap()));
        assert_eq!(parse_amount("dunno"), None);
    }

    #[test]
    fn script_cursor_derives_from_draft() {
        let mut draft = ClaimDraft::new(None, None);
        let q = next_question(FnolState::IncidentCore, &draft, ProductLine::Auto).unwrap();
        assert_eq!(q.field, "loss_type");

        draft.incident.loss_type = Some(LossType::Glass);
        let q = next_question(FnolState::IncidentCore, &draft, ProductLine::Auto).unwrap();
        // glass has no subtype follow-up
        assert_eq!(q.field, "incident_date");

        draft.incident.loss_type = Some(LossType::Collision);
        let q = next_question(FnolState::IncidentCore, &draft, ProductLine::Auto).unwrap();
        assert_eq!(q.field, "loss_subtype");
    }

    #[test]
    fn damage_script_ends_with_photo_gate() {
        let mut draft = ClaimDraft::new(None, None);
        draft.damage.areas = vec!["front".into()];
        draft.damage.description = Some("dented bumper and broken headlight".into());
        draft.damage.estimated_amount = Some(Decimal::from(3000));

        let q = next_question(FnolState::DamageEvidence, &draft, ProductLine::Auto).unwrap();
        assert_eq!(q.field, "damage_photo");
        assert_eq!(q.input.kind, InputKind::Photo);

        draft.evidence.push(crate::draft::EvidenceItem {
            evidence_ref: "ev-1".into(),
            kind: crate::draft::EvidenceKind::Photo,
            subtype: Some("damage".into()),
            upload_status: crate::draft::UploadStatus::Uploaded,
            entities: None,
        });
        assert!(next_question(FnolState::DamageEvidence, &draft, ProductLine::Auto).is_none());
    }

    #[test]
    fn severe_injury_answer_is_an_emergency() {
        let mut draft = ClaimDraft::new(None, None);
        let effect = apply_answer(
            &mut draft,
            ProductLine::Auto,
            "injury_severity",
            "severe",
            today(),
        )
        .unwrap();
        assert!(matches!(effect, AnswerEffect::Emergency { .. }));
    }

    #[test]
    fn failed_parse_reports_errors_without_merging() {
        let mut draft = ClaimDraft::new(None, None);
        let errors = apply_answer(
            &mut draft,
            ProductLine::Auto,
            "incident_date",
            "not a date",
            today(),
        )
        .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(draft.incident.date.is_none());
    }
}
