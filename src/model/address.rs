//! Email addresses as they appear in the `from` and `to` form fields.

/// A sender or recipient address.
///
/// # Examples
/// - `"Juan García <juan@ejemplo.com>"` → `display_name = "Juan García"`, `address = "juan@ejemplo.com"`
/// - `"user@example.com"` → `display_name = ""`, `address = "user@example.com"`
#[derive(Debug, Clone, PartialEq)]
pub struct EmailAddress {
    /// Human-readable display name (may be empty).
    pub display_name: String,
    /// The bare email address (`user@domain`).
    pub address: String,
}

impl EmailAddress {
    /// Build an address from optional parts as delivered by the MIME parser.
    pub fn from_parts(display_name: Option<&str>, address: Option<&str>) -> Self {
        Self {
            display_name: display_name.map(str::trim).unwrap_or_default().to_string(),
            address: address.map(str::trim).unwrap_or_default().to_string(),
        }
    }

    /// `true` if neither an address nor a display name is present.
    pub fn is_empty(&self) -> bool {
        self.address.is_empty() && self.display_name.is_empty()
    }

    /// Value used inside the `from` and `to` form fields: `"address; display name"`.
    ///
    /// The separator is kept even when the display name is empty so receivers
    /// can always split on `"; "`.
    pub fn form_value(&self) -> String {
        format!("{}; {}", self.address, self.display_name)
    }

    /// Format for display: `"Display Name <address>"` or just `"address"`.
    pub fn display(&self) -> String {
        if self.display_name.is_empty() {
            self.address.clone()
        } else {
            format!("{} <{}>", self.display_name, self.address)
        }
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}
