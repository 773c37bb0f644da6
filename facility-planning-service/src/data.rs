//! Static medical-desert reference data and the fallback placement policy
//! for reports that arrive without coordinates.

use rand::Rng;

use crate::models::{MedicalDesert, PopulationDensity};

/// Center of Ghana, the last-resort anchor for unplaceable reports.
const COUNTRY_CENTROID: (f64, f64) = (7.9465, -1.0232);

pub fn desert_regions() -> Vec<MedicalDesert> {
    vec![
        MedicalDesert {
            id: "d1".to_string(),
            region: "Northern Cluster".to_string(),
            population_density: PopulationDensity::Medium,
            primary_gaps: vec![
                "Specialist surgeons".to_string(),
                "NICU equipment".to_string(),
            ],
            severity: 85,
            coordinates: (9.4007, -0.8393),
            predicted_risk: 0.82,
            predictive_gaps: vec![
                "Intensive Care capacity".to_string(),
                "Specialized trauma center".to_string(),
            ],
        },
        MedicalDesert {
            id: "d2".to_string(),
            region: "Western North Hub".to_string(),
            population_density: PopulationDensity::Low,
            primary_gaps: vec![
                "Emergency transport".to_string(),
                "Diagnostic imaging".to_string(),
            ],
            severity: 92,
            coordinates: (6.3248, -2.4833),
            predicted_risk: 0.95,
            predictive_gaps: vec![
                "Broadband for telemedicine".to_string(),
                "Cold chain storage".to_string(),
            ],
        },
        MedicalDesert {
            id: "d3".to_string(),
            region: "Upper East Frontier".to_string(),
            population_density: PopulationDensity::Low,
            primary_gaps: vec![
                "Physician saturation".to_string(),
                "Clean water".to_string(),
            ],
            severity: 78,
            coordinates: (10.8907, -0.8493),
            predicted_risk: 0.75,
            predictive_gaps: vec![
                "Solar infrastructure".to_string(),
                "Mobile health units".to_string(),
            ],
        },
        MedicalDesert {
            id: "d4".to_string(),
            region: "Oti Corridor".to_string(),
            population_density: PopulationDensity::Low,
            primary_gaps: vec![
                "Maternal care".to_string(),
                "Vaccine storage".to_string(),
            ],
            severity: 89,
            coordinates: (7.9, 0.4),
            predicted_risk: 0.88,
            predictive_gaps: vec![
                "Emergency air-lift".to_string(),
                "Blood bank".to_string(),
            ],
        },
    ]
}

/// Place an uncoordinated report near its region's desert cluster, or
/// near the country centroid when the region is unrecognized. Jitter
/// keeps co-located markers from stacking exactly.
pub fn fallback_coordinates(region: &str) -> (f64, f64) {
    let mut rng = rand::thread_rng();
    let needle = region.trim().to_lowercase();

    let anchor = desert_regions()
        .into_iter()
        .find(|d| {
            let hay = d.region.to_lowercase();
            !needle.is_empty() && (hay.contains(&needle) || needle.contains(&hay))
        })
        .map(|d| d.coordinates);

    match anchor {
        Some((lat, lng)) => (
            lat + rng.gen_range(-0.15..0.15),
            lng + rng.gen_range(-0.15..0.15),
        ),
        None => (
            COUNTRY_CENTROID.0 + rng.gen_range(-1.2..1.2),
            COUNTRY_CENTROID.1 + rng.gen_range(-1.2..1.2),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_region_anchors_to_its_cluster() {
        let (lat, lng) = fallback_coordinates("Northern Cluster");
        assert!((lat - 9.4007).abs() < 0.2);
        assert!((lng + 0.8393).abs() < 0.2);
    }

    #[test]
    fn partial_region_names_still_match() {
        let (lat, _) = fallback_coordinates("northern");
        assert!((lat - 9.4007).abs() < 0.2);
    }

    #[test]
    fn unknown_region_lands_inside_the_country() {
        let (lat, lng) = fallback_coordinates("Atlantis");
        assert!((4.0..12.0).contains(&lat));
        assert!((-3.5..1.5).contains(&lng));
    }
}
