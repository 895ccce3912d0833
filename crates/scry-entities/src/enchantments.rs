//! Short labels for enchantments shown next to equipment.

use std::borrow::Cow;

/// Abbreviation for an enchantment identifier such as `"sharpness"` or
/// `"minecraft:sharpness"`. Unknown identifiers fall back to their first two
/// characters upper-cased.
pub fn abbreviate(id: &str) -> Cow<'static, str> {
    let path = id.rsplit_once(':').map_or(id, |(_, path)| path);
    match known(path) {
        Some(abbr) => Cow::Borrowed(abbr),
        None => Cow::Owned(path.chars().take(2).collect::<String>().to_uppercase()),
    }
}

fn known(path: &str) -> Option<&'static str> {
    let abbr = match path {
        "protection" => "PR",
        "fire_protection" => "FP",
        "feather_falling" => "FF",
        "blast_protection" => "BP",
        "projectile_protection" => "PP",
        "respiration" => "R",
        "aqua_affinity" => "AA",
        "thorns" => "TH",
        "depth_strider" => "DS",
        "frost_walker" => "FW",
        "binding_curse" => "CB",
        "sharpness" => "SH",
        "smite" => "SM",
        "bane_of_arthropods" => "BA",
        "knockback" => "KB",
        "fire_aspect" => "FA",
        "looting" => "LO",
        "sweeping" => "SW",
        "efficiency" => "EF",
        "silk_touch" => "ST",
        "unbreaking" => "UB",
        "fortune" => "FO",
        "power" => "PO",
        "punch" => "PU",
        "flame" => "FL",
        "infinity" => "IN",
        "luck_of_the_sea" => "LS",
        "lure" => "LU",
        "loyalty" => "LY",
        "impaling" => "IM",
        "riptide" => "RI",
        "channeling" => "CH",
        "multishot" => "MS",
        "quick_charge" => "QC",
        "piercing" => "PI",
        "mending" => "ME",
        "vanishing_curse" => "CV",
        "soul_speed" => "SS",
        "swift_sneak" => "SN",
        _ => return None,
    };
    Some(abbr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_abbreviations() {
        assert_eq!(abbreviate("sharpness"), "SH");
        assert_eq!(abbreviate("respiration"), "R");
        assert_eq!(abbreviate("minecraft:mending"), "ME");
    }

    #[test]
    fn test_unknown_falls_back_to_prefix() {
        assert_eq!(abbreviate("density"), "DE");
        assert_eq!(abbreviate("modpack:x"), "X");
        assert_eq!(abbreviate(""), "");
    }
}
