//! Derived health fields computed from raw survey answers

use crate::types::Cell;

/// Alcohol frequency answers that count as drinking
const DRINKING_FREQUENCIES: &[&str] = &[
    "Rarely (a few times/month)",
    "Rarely (less than once/week)",
    "Occasionally (1-2 times/week)",
    "Regularly (3-5 times/week)",
    "Daily",
];

const NEVER_DRINKS: &str = "Never";

/// Condition answer meaning the participant does not have it
pub const NO_CONDITION: &str = "I do not have this condition";

pub const NO_RECENT_ANTIBIOTICS: &str = "I have not taken antibiotics in the past year.";

const BMI_PLAUSIBLE: (f64, f64) = (8.0, 80.0);

/// Yes/No alcohol consumption from the frequency answer
pub fn categorize_etoh(frequency: &Cell) -> Cell {
    match frequency.value() {
        Some(NEVER_DRINKS) => Cell::text("No"),
        Some(v) if DRINKING_FREQUENCIES.contains(&v) => Cell::text("Yes"),
        _ => Cell::Unspecified,
    }
}

/// BMI limited to the plausible range, two decimals
pub fn correct_bmi(bmi: &Cell) -> Cell {
    match bmi.as_f64() {
        Some(b) if (BMI_PLAUSIBLE.0..=BMI_PLAUSIBLE.1).contains(&b) => {
            Cell::text(format!("{:.2}", b))
        }
        _ => Cell::Unspecified,
    }
}

pub fn categorize_bmi(bmi: &Cell) -> Cell {
    let Some(b) = bmi.as_f64() else {
        return Cell::Unspecified;
    };
    let category = if b < 18.5 {
        "Underweight"
    } else if b < 25.0 {
        "Normal"
    } else if b < 30.0 {
        "Overweight"
    } else {
        "Obese"
    };
    Cell::text(category)
}

/// Self-reported age, blanked when it contradicts the other answers
///
/// Toddler ages reported together with adult height, adult weight or
/// alcohol consumption are treated as entry mistakes.
pub fn correct_age(age: &Cell, height_cm: &Cell, weight_kg: &Cell, alcohol: &Cell) -> Cell {
    let Some(years) = age.as_f64() else {
        return Cell::Unspecified;
    };
    if years < 4.0 {
        let too_tall = height_cm.as_f64().map(|h| h > 91.4).unwrap_or(false);
        let too_heavy = weight_kg.as_f64().map(|w| w > 16.3).unwrap_or(false);
        let drinks = alcohol.value() == Some("Yes");
        if too_tall || too_heavy || drinks {
            return Cell::Unspecified;
        }
    }
    age.clone()
}

pub fn categorize_age(age: &Cell) -> Cell {
    let Some(years) = age.as_f64() else {
        return Cell::Unspecified;
    };
    let category = match years {
        y if y < 3.0 => "baby",
        y if y < 13.0 => "child",
        y if y < 20.0 => "teen",
        y if y < 30.0 => "20s",
        y if y < 40.0 => "30s",
        y if y < 50.0 => "40s",
        y if y < 60.0 => "50s",
        y if y < 70.0 => "60s",
        _ => "70+",
    };
    Cell::text(category)
}

/// Numeric answer inside `[low, high)`
pub fn within(cell: &Cell, low: f64, high: f64) -> bool {
    cell.as_f64().map(|v| v >= low && v < high).unwrap_or(false)
}

/// (month, year) parts of a `YYYY-MM[-DD]` birth date
pub fn split_birth_date(birth_date: &Cell) -> (Cell, Cell) {
    let Some(value) = birth_date.value() else {
        return (Cell::Unspecified, Cell::Unspecified);
    };
    let mut parts = value.split('-');
    let year = parts.next().map(Cell::from_raw).unwrap_or(Cell::Unspecified);
    let month = parts.next().map(Cell::from_raw).unwrap_or(Cell::Unspecified);
    (month, year)
}
