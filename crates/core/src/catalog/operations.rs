//! Pure validation rules for catalog entities.

use super::{Admin, AuditLog, Badge, Category, Link, Marketplace, Product, ValidationError};

const MAX_NAME_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 5_000;
const MAX_URL_LEN: usize = 2_048;

/// Validates that a text field is non-blank and within `max` characters.
pub fn validate_text(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required { field });
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

/// Returns true for lowercase ASCII slugs like `running-shoes-2024`.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--")
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Returns true for absolute http(s) URLs with a host.
pub fn is_valid_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(rest) => {
            let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
            !host.is_empty() && !host.contains(char::is_whitespace) && url.len() <= MAX_URL_LEN
        }
        None => false,
    }
}

/// Returns true for `#RRGGBB` colors.
pub fn is_valid_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Returns true for addresses with exactly one `@` and non-empty parts.
pub fn is_valid_email(email: &str) -> bool {
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        _ => false,
    }
}

fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    if is_valid_slug(slug) {
        Ok(())
    } else {
        Err(ValidationError::InvalidSlug(slug.to_string()))
    }
}

fn validate_description(description: Option<&str>) -> Result<(), ValidationError> {
    match description {
        Some(text) if text.chars().count() > MAX_DESCRIPTION_LEN => Err(ValidationError::TooLong {
            field: "description",
            max: MAX_DESCRIPTION_LEN,
        }),
        _ => Ok(()),
    }
}

fn validate_price(price_cents: i64) -> Result<(), ValidationError> {
    if price_cents < 0 {
        return Err(ValidationError::Negative {
            field: "price_cents",
        });
    }
    Ok(())
}

pub fn validate_product(product: &Product) -> Result<(), ValidationError> {
    validate_text("name", &product.name, MAX_NAME_LEN)?;
    validate_slug(&product.slug)?;
    validate_description(product.description.as_deref())?;
    validate_price(product.price_cents)
}

pub fn validate_category(category: &Category) -> Result<(), ValidationError> {
    validate_text("name", &category.name, MAX_NAME_LEN)?;
    validate_slug(&category.slug)?;
    validate_description(category.description.as_deref())?;

    if category.id.is_some() && category.parent_id == category.id {
        return Err(ValidationError::SelfParent);
    }

    Ok(())
}

pub fn validate_marketplace(marketplace: &Marketplace) -> Result<(), ValidationError> {
    validate_text("name", &marketplace.name, MAX_NAME_LEN)?;
    validate_slug(&marketplace.slug)?;
    if !is_valid_url(&marketplace.base_url) {
        return Err(ValidationError::InvalidUrl(marketplace.base_url.clone()));
    }
    Ok(())
}

pub fn validate_link(link: &Link) -> Result<(), ValidationError> {
    if !is_valid_url(&link.url) {
        return Err(ValidationError::InvalidUrl(link.url.clone()));
    }
    validate_price(link.price_cents)
}

pub fn validate_badge(badge: &Badge) -> Result<(), ValidationError> {
    validate_text("name", &badge.name, 50)?;
    if !is_valid_color(&badge.color) {
        return Err(ValidationError::InvalidColor(badge.color.clone()));
    }
    Ok(())
}

pub fn validate_admin(admin: &Admin) -> Result<(), ValidationError> {
    validate_text("username", &admin.username, 64)?;
    if !is_valid_email(&admin.email) {
        return Err(ValidationError::InvalidEmail(admin.email.clone()));
    }
    Ok(())
}

pub fn validate_audit_log(log: &AuditLog) -> Result<(), ValidationError> {
    validate_text("action", &log.action, 100)?;
    validate_text("entity_type", &log.entity_type, 100)
}
