use serde::{Deserialize, Serialize};

// Table rows

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
#[serde(rename_all = "PascalCase")]
pub struct Region {
    #[serde(rename = "RegionID")]
    #[sqlx(rename = "RegionID")]
    pub region_id: i64,
    #[sqlx(rename = "RegionName")]
    pub region_name: String,
    #[sqlx(rename = "RegionalDirector")]
    pub regional_director: String,
    #[sqlx(rename = "OfficeLocation")]
    pub office_location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
#[serde(rename_all = "PascalCase")]
pub struct InfrastructureAsset {
    #[serde(rename = "AssetID")]
    #[sqlx(rename = "AssetID")]
    pub asset_id: i64,
    #[sqlx(rename = "AssetName")]
    pub asset_name: String,
    #[sqlx(rename = "AssetType")]
    pub asset_type: String,
    #[sqlx(rename = "ConstructionYear")]
    pub construction_year: i64,
    #[sqlx(rename = "LastMajorMaintenance")]
    pub last_major_maintenance: Option<String>,
    #[sqlx(rename = "Status")]
    pub status: String,
    #[serde(rename = "RegionID")]
    #[sqlx(rename = "RegionID")]
    pub region_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
#[serde(rename_all = "PascalCase")]
pub struct MaintenanceProject {
    #[serde(rename = "ProjectID")]
    #[sqlx(rename = "ProjectID")]
    pub project_id: i64,
    #[serde(rename = "AssetID")]
    #[sqlx(rename = "AssetID")]
    pub asset_id: i64,
    #[sqlx(rename = "ProjectName")]
    pub project_name: String,
    #[sqlx(rename = "ProjectType")]
    pub project_type: String,
    #[sqlx(rename = "StartDate")]
    pub start_date: String,
    #[sqlx(rename = "EndDate")]
    pub end_date: String,
    #[sqlx(rename = "Budget")]
    pub budget: f64,
    #[sqlx(rename = "Status")]
    pub status: String,
    #[sqlx(rename = "Priority")]
    pub priority: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
#[serde(rename_all = "PascalCase")]
pub struct SafetyInspection {
    #[serde(rename = "InspectionID")]
    #[sqlx(rename = "InspectionID")]
    pub inspection_id: i64,
    #[serde(rename = "AssetID")]
    #[sqlx(rename = "AssetID")]
    pub asset_id: i64,
    #[sqlx(rename = "InspectionDate")]
    pub inspection_date: String,
    #[sqlx(rename = "InspectorName")]
    pub inspector_name: String,
    #[sqlx(rename = "InspectionType")]
    pub inspection_type: String,
    #[sqlx(rename = "SafetyRating")]
    pub safety_rating: i64,
    #[sqlx(rename = "Findings")]
    pub findings: Option<String>,
    #[sqlx(rename = "RecommendedActions")]
    pub recommended_actions: Option<String>,
}

// Report rows returned by the API endpoints

/// A row of `vw_CriticalAssets`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
#[serde(rename_all = "PascalCase")]
pub struct CriticalAsset {
    #[serde(rename = "AssetID")]
    #[sqlx(rename = "AssetID")]
    pub asset_id: i64,
    #[sqlx(rename = "AssetName")]
    pub asset_name: String,
    #[sqlx(rename = "AssetType")]
    pub asset_type: String,
    #[sqlx(rename = "RegionName")]
    pub region_name: String,
    #[sqlx(rename = "Status")]
    pub status: String,
    #[sqlx(rename = "SafetyRating")]
    pub safety_rating: Option<i64>,
    #[sqlx(rename = "InspectionDate")]
    pub inspection_date: Option<String>,
    #[sqlx(rename = "Findings")]
    pub findings: Option<String>,
    #[sqlx(rename = "RecommendedActions")]
    pub recommended_actions: Option<String>,
}

/// An asset of one region joined with its latest inspection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
#[serde(rename_all = "PascalCase")]
pub struct RegionAsset {
    #[sqlx(rename = "RegionName")]
    pub region_name: String,
    #[sqlx(rename = "AssetType")]
    pub asset_type: String,
    #[sqlx(rename = "AssetName")]
    pub asset_name: String,
    #[sqlx(rename = "Status")]
    pub status: String,
    #[sqlx(rename = "ConstructionYear")]
    pub construction_year: i64,
    #[sqlx(rename = "LastMajorMaintenance")]
    pub last_major_maintenance: Option<String>,
    #[sqlx(rename = "SafetyRating")]
    pub safety_rating: Option<i64>,
    #[sqlx(rename = "InspectionDate")]
    pub inspection_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
#[serde(rename_all = "PascalCase")]
pub struct RegionSummary {
    #[sqlx(rename = "RegionName")]
    pub region_name: String,
    #[sqlx(rename = "TotalAssets")]
    pub total_assets: i64,
    #[sqlx(rename = "CriticalAssets")]
    pub critical_assets: i64,
    #[sqlx(rename = "UnderMaintenance")]
    pub under_maintenance: i64,
    #[sqlx(rename = "AvgSafetyRating")]
    pub avg_safety_rating: Option<f64>,
}

/// A row of `vw_ActiveProjects`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
#[serde(rename_all = "PascalCase")]
pub struct ActiveProject {
    #[serde(rename = "ProjectID")]
    #[sqlx(rename = "ProjectID")]
    pub project_id: i64,
    #[sqlx(rename = "ProjectName")]
    pub project_name: String,
    #[sqlx(rename = "ProjectType")]
    pub project_type: String,
    #[sqlx(rename = "AssetName")]
    pub asset_name: String,
    #[sqlx(rename = "AssetType")]
    pub asset_type: String,
    #[sqlx(rename = "RegionName")]
    pub region_name: String,
    #[sqlx(rename = "Priority")]
    pub priority: String,
    #[sqlx(rename = "Status")]
    pub status: String,
    #[sqlx(rename = "StartDate")]
    pub start_date: String,
    #[sqlx(rename = "EndDate")]
    pub end_date: String,
    #[sqlx(rename = "Budget")]
    pub budget: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
#[serde(rename_all = "PascalCase")]
pub struct InspectionReport {
    #[serde(rename = "InspectionID")]
    #[sqlx(rename = "InspectionID")]
    pub inspection_id: i64,
    #[sqlx(rename = "AssetName")]
    pub asset_name: String,
    #[sqlx(rename = "AssetType")]
    pub asset_type: String,
    #[sqlx(rename = "RegionName")]
    pub region_name: String,
    #[sqlx(rename = "InspectionDate")]
    pub inspection_date: String,
    #[sqlx(rename = "InspectionType")]
    pub inspection_type: String,
    #[sqlx(rename = "SafetyRating")]
    pub safety_rating: i64,
    #[sqlx(rename = "Findings")]
    pub findings: Option<String>,
    #[sqlx(rename = "RecommendedActions")]
    pub recommended_actions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
#[serde(rename_all = "PascalCase")]
pub struct AssetStatistics {
    #[sqlx(rename = "AssetType")]
    pub asset_type: String,
    #[sqlx(rename = "TotalAssets")]
    pub total_assets: i64,
    #[sqlx(rename = "AvgAge")]
    pub avg_age: f64,
    #[sqlx(rename = "CriticalCount")]
    pub critical_count: i64,
    #[sqlx(rename = "UnderMaintenanceCount")]
    pub under_maintenance_count: i64,
    #[sqlx(rename = "OperationalCount")]
    pub operational_count: i64,
}

// Request filters

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RegionFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InspectionFilter {
    #[serde(default)]
    pub asset_type: Option<String>,
    #[serde(default = "default_min_rating")]
    pub min_safety_rating: i64,
    #[serde(default = "default_max_rating")]
    pub max_safety_rating: i64,
}

fn default_min_rating() -> i64 {
    1
}

fn default_max_rating() -> i64 {
    5
}

impl Default for InspectionFilter {
    fn default() -> Self {
        Self {
            asset_type: None,
            min_safety_rating: default_min_rating(),
            max_safety_rating: default_max_rating(),
        }
    }
}

/// Envelope of every successful API response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsEnvelope<T> {
    pub results: Vec<T>,
}

/// Body of a failed API response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default)]
    pub details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_asset_uses_pascal_case_keys() {
        let asset = CriticalAsset {
            asset_id: 4,
            asset_name: "Van Brienenoordbrug".to_string(),
            asset_type: "Bridge".to_string(),
            region_name: "Zuid-Holland".to_string(),
            status: "Critical".to_string(),
            safety_rating: Some(1),
            inspection_date: Some("2024-03-02".to_string()),
            findings: None,
            recommended_actions: None,
        };
        let json = serde_json::to_value(&asset).unwrap();
        assert_eq!(json["AssetID"], 4);
        assert_eq!(json["AssetName"], "Van Brienenoordbrug");
        assert_eq!(json["SafetyRating"], 1);
        assert!(json["Findings"].is_null());
    }

    #[test]
    fn test_inspection_filter_defaults() {
        let filter: InspectionFilter = serde_json::from_str("{}").unwrap();
        assert_eq!(filter, InspectionFilter::default());

        let filter: InspectionFilter =
            serde_json::from_str(r#"{"asset_type":"Bridge","max_safety_rating":2}"#).unwrap();
        assert_eq!(filter.asset_type.as_deref(), Some("Bridge"));
        assert_eq!(filter.min_safety_rating, 1);
        assert_eq!(filter.max_safety_rating, 2);
    }
}
