use common::models::Signal;
use thiserror::Error;

/// The label each required field carries in a channel post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldKeys {
    pub market: &'static str,
    pub position: &'static str,
    pub entry: &'static str,
    pub target: &'static str,
    pub stop_loss: &'static str,
    pub leverage: &'static str,
    /// A line containing this token ends the scan.
    pub sentinel: Option<&'static str>,
}

impl FieldKeys {
    pub const PERSIAN: FieldKeys = FieldKeys {
        market: "نام",
        position: "نوع پوزیشن",
        entry: "نقطه ورود",
        target: "تارگت",
        stop_loss: "حدضرر",
        leverage: "اهرم",
        sentinel: Some("سیگنال"),
    };
}

impl Default for FieldKeys {
    fn default() -> Self {
        Self::PERSIAN
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("required field {0} is missing")]
    MissingField(&'static str),
    #[error("field {field} has a malformed line: {line:?}")]
    MalformedLine { field: &'static str, line: String },
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Market,
    Position,
    Entry,
    Target,
    StopLoss,
    Leverage,
}

impl Field {
    const ALL: [Field; 6] = [
        Field::Market,
        Field::Position,
        Field::Entry,
        Field::Target,
        Field::StopLoss,
        Field::Leverage,
    ];

    fn name(&self) -> &'static str {
        match self {
            Field::Market => "market",
            Field::Position => "position",
            Field::Entry => "entry",
            Field::Target => "target",
            Field::StopLoss => "stop_loss",
            Field::Leverage => "leverage",
        }
    }

    fn key(&self, keys: &FieldKeys) -> &'static str {
        match self {
            Field::Market => keys.market,
            Field::Position => keys.position,
            Field::Entry => keys.entry,
            Field::Target => keys.target,
            Field::StopLoss => keys.stop_loss,
            Field::Leverage => keys.leverage,
        }
    }
}

/// Extracts a signal using the default (Persian) field labels.
pub fn extract(text: &str) -> Result<Signal, ValidationError> {
    extract_with(text, &FieldKeys::default())
}

/// Extracts a signal from a channel post.
///
/// Every labelled line must split on `:` into exactly a label and a value.
/// Entry and target lines accumulate in the order they appear, the other
/// fields keep the last matching line. Anything short of all six fields is a
/// rejection.
pub fn extract_with(text: &str, keys: &FieldKeys) -> Result<Signal, ValidationError> {
    let lines: Vec<&str> = text
        .lines()
        .take_while(|line| keys.sentinel.is_none_or(|sentinel| !line.contains(sentinel)))
        .collect();

    let mut signal = Signal {
        market: String::new(),
        position: String::new(),
        entry_points: Vec::new(),
        targets: Vec::new(),
        stop_loss: String::new(),
        leverage: String::new(),
    };

    for field in Field::ALL {
        let key = field.key(keys);
        let mut found = false;

        for line in lines.iter().filter(|line| line.contains(key)) {
            found = true;
            let value = field_value(field, line)?;

            match field {
                Field::Market => signal.market = value,
                Field::Position => signal.position = value,
                Field::Entry => signal.entry_points.push(value),
                Field::Target => signal.targets.push(value),
                Field::StopLoss => signal.stop_loss = value,
                Field::Leverage => signal.leverage = value,
            }
        }

        if !found {
            return Err(ValidationError::MissingField(field.name()));
        }
    }

    Ok(signal)
}

fn field_value(field: Field, line: &str) -> Result<String, ValidationError> {
    let malformed = || ValidationError::MalformedLine {
        field: field.name(),
        line: line.to_string(),
    };

    let parts: Vec<&str> = line.split(':').collect();
    if parts.len() != 2 {
        return Err(malformed());
    }

    let value = normalize(parts[1]);
    if value.is_empty() {
        return Err(malformed());
    }
    Ok(value)
}

fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '/'))
        .collect()
}
