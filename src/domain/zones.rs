//! Destination classification into GAM / outside GAM / international.

use std::collections::HashSet;

use super::entities::{CarrierVariant, Destination, DestinationZone};
use crate::error::{Result, ShippingError};

pub const HOME_COUNTRY: &str = "CR";

/// Cantons of the Greater Metropolitan Area as (province, canton) codes.
const GAM_CANTONS: &[(u8, u8)] = &[
    // San José
    (1, 1),
    (1, 2),
    (1, 3),
    (1, 6),
    (1, 7),
    (1, 8),
    (1, 9),
    (1, 10),
    (1, 11),
    (1, 13),
    (1, 14),
    (1, 15),
    (1, 18),
    // Alajuela
    (2, 1),
    (2, 5),
    (2, 8),
    // Cartago
    (3, 1),
    (3, 2),
    (3, 3),
    (3, 6),
    (3, 7),
    (3, 8),
    // Heredia
    (4, 1),
    (4, 2),
    (4, 3),
    (4, 4),
    (4, 5),
    (4, 6),
    (4, 7),
    (4, 8),
    (4, 9),
];

#[derive(Clone, Debug)]
pub struct ZoneResolver {
    gam_cantons: HashSet<(u8, u8)>,
}

impl Default for ZoneResolver {
    fn default() -> Self {
        Self::new(GAM_CANTONS.iter().copied())
    }
}

impl ZoneResolver {
    pub fn new(gam_cantons: impl IntoIterator<Item = (u8, u8)>) -> Self {
        Self {
            gam_cantons: gam_cantons.into_iter().collect(),
        }
    }

    pub fn is_gam(&self, province: u8, canton: u8) -> bool {
        self.gam_cantons.contains(&(province, canton))
    }

    pub fn resolve(
        &self,
        destination: &Destination,
        variant: CarrierVariant,
    ) -> Result<DestinationZone> {
        let country = destination.country.trim();
        if !country.is_empty() && !country.eq_ignore_ascii_case(HOME_COUNTRY) {
            return Ok(DestinationZone::International);
        }

        let province = destination
            .province
            .as_deref()
            .and_then(parse_province)
            .ok_or_else(|| {
                ShippingError::InvalidZone(format!(
                    "unknown province {:?}",
                    destination.province.as_deref().unwrap_or_default()
                ))
            })?;

        match destination.canton.as_deref().and_then(parse_canton) {
            Some(canton) if self.is_gam(province, canton) => Ok(DestinationZone::InsideGam),
            Some(_) => Ok(DestinationZone::OutsideGam),
            None if variant == CarrierVariant::Pymexpress => Err(ShippingError::InvalidZone(
                format!("missing canton for province {province}"),
            )),
            None => Ok(DestinationZone::OutsideGam),
        }
    }
}

/// Accepts numeric codes `1`..`7` and the commerce state codes.
pub fn parse_province(raw: &str) -> Option<u8> {
    let raw = raw.trim();
    let code = raw
        .strip_prefix("CR-")
        .or_else(|| raw.strip_prefix("CR"))
        .unwrap_or(raw);
    if let Ok(number) = code.parse::<u8>() {
        return (1..=7).contains(&number).then_some(number);
    }
    match code.to_ascii_uppercase().as_str() {
        "SJ" => Some(1),
        "A" => Some(2),
        "C" => Some(3),
        "H" => Some(4),
        "G" => Some(5),
        "P" => Some(6),
        "L" => Some(7),
        _ => None,
    }
}

pub fn parse_canton(raw: &str) -> Option<u8> {
    raw.trim().parse::<u8>().ok().filter(|code| *code > 0)
}
