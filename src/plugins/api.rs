use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::ApimConfig;
use crate::error::{Result, WorkshopError};
use crate::models::{
    ActiveProject, AssetStatistics, CriticalAsset, ErrorBody, InspectionFilter, InspectionReport, RegionAsset,
    RegionFilter, RegionSummary, ResultsEnvelope,
};
use crate::plugins::{int_arg, string_arg, FunctionDefinition, FunctionParameter, KernelPlugin, ParameterType};

/// The backend operations reachable through the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiOperation {
    CriticalAssets,
    AssetsByRegion,
    ActiveProjects,
    SafetyInspections,
    AssetStatistics,
}

impl ApiOperation {
    pub fn all() -> [ApiOperation; 5] {
        [
            ApiOperation::CriticalAssets,
            ApiOperation::AssetsByRegion,
            ApiOperation::ActiveProjects,
            ApiOperation::SafetyInspections,
            ApiOperation::AssetStatistics,
        ]
    }

    /// Path relative to the route prefix.
    pub fn path(self) -> &'static str {
        match self {
            ApiOperation::CriticalAssets => "/infrastructure/critical",
            ApiOperation::AssetsByRegion => "/infrastructure/by-region",
            ApiOperation::ActiveProjects => "/maintenance/active-projects",
            ApiOperation::SafetyInspections => "/safety/inspections",
            ApiOperation::AssetStatistics => "/assets/statistics",
        }
    }

    /// Noun used in error sentences, as in "Error getting critical assets".
    pub fn subject(self) -> &'static str {
        match self {
            ApiOperation::CriticalAssets => "critical assets",
            ApiOperation::AssetsByRegion => "assets by region",
            ApiOperation::ActiveProjects => "active projects",
            ApiOperation::SafetyInspections => "safety inspections",
            ApiOperation::AssetStatistics => "asset statistics",
        }
    }
}

impl std::fmt::Display for ApiOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// HTTP client for the infrastructure API behind the gateway.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    subscription_key: String,
}

impl ApiClient {
    pub fn new(config: &ApimConfig) -> Result<Self> {
        let (gateway_url, subscription_key) = config.credentials()?;
        Self::from_parts(gateway_url, subscription_key, &config.route_prefix, config.timeout)
    }

    pub fn from_parts(gateway_url: &str, subscription_key: &str, route_prefix: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WorkshopError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: format!("{}{}", gateway_url.trim_end_matches('/'), route_prefix.trim_end_matches('/')),
            subscription_key: subscription_key.to_string(),
        })
    }

    pub fn url(&self, operation: ApiOperation) -> String {
        format!("{}{}", self.base_url, operation.path())
    }

    /// POST the payload (or `{}`) and return the decoded success body.
    pub async fn call(&self, operation: ApiOperation, payload: Option<&Value>) -> Result<Value> {
        let url = self.url(operation);
        let empty = json!({});
        let payload = payload.unwrap_or(&empty);
        debug!("POST {} {}", url, payload);

        let response = self
            .client
            .post(&url)
            .header("api-key", &self.subscription_key)
            .json(payload)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        let body: Option<Value> = serde_json::from_str(&text).ok();

        if !(200..300).contains(&status) {
            return Err(match body.and_then(|b| serde_json::from_value::<ErrorBody>(b).ok()) {
                Some(ErrorBody { error, details }) => WorkshopError::Api { status, error, details },
                None if text.trim().is_empty() => WorkshopError::api(status, format!("{} failed", operation)),
                None => WorkshopError::api(status, text),
            });
        }

        let body = body.ok_or_else(|| WorkshopError::Parse(format!("Invalid JSON from {}", operation)))?;
        if let Some(error) = body.get("error").and_then(Value::as_str) {
            return Err(WorkshopError::Api {
                status,
                error: error.to_string(),
                details: body.get("details").and_then(Value::as_str).map(str::to_string),
            });
        }
        if !body.get("results").is_some_and(Value::is_array) {
            return Err(WorkshopError::api(status, format!("Response from {} has no results", operation)));
        }
        Ok(body)
    }

    pub async fn fetch<T: DeserializeOwned>(&self, operation: ApiOperation, payload: Option<&Value>) -> Result<Vec<T>> {
        let body = self.call(operation, payload).await?;
        let envelope: ResultsEnvelope<T> = serde_json::from_value(body)?;
        Ok(envelope.results)
    }

    pub async fn critical_assets(&self) -> Result<Vec<CriticalAsset>> {
        self.fetch(ApiOperation::CriticalAssets, None).await
    }

    pub async fn assets_in_region(&self, region_name: &str) -> Result<Vec<RegionAsset>> {
        let filter = serde_json::to_value(RegionFilter {
            region_name: Some(region_name.to_string()),
        })?;
        self.fetch(ApiOperation::AssetsByRegion, Some(&filter)).await
    }

    pub async fn region_summaries(&self) -> Result<Vec<RegionSummary>> {
        self.fetch(ApiOperation::AssetsByRegion, None).await
    }

    pub async fn active_projects(&self) -> Result<Vec<ActiveProject>> {
        self.fetch(ApiOperation::ActiveProjects, None).await
    }

    pub async fn safety_inspections(&self, filter: &InspectionFilter) -> Result<Vec<InspectionReport>> {
        let filter = serde_json::to_value(filter)?;
        self.fetch(ApiOperation::SafetyInspections, Some(&filter)).await
    }

    pub async fn asset_statistics(&self) -> Result<Vec<AssetStatistics>> {
        self.fetch(ApiOperation::AssetStatistics, None).await
    }
}

/// Infrastructure reports for agents, rendered as plain text.
pub struct ApiManagementPlugin {
    client: ApiClient,
}

impl ApiManagementPlugin {
    pub const NAME: &'static str = "ApiManagement";

    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: &ApimConfig) -> Result<Self> {
        Ok(Self::new(ApiClient::new(config)?))
    }

    pub async fn get_critical_assets(&self) -> String {
        report(ApiOperation::CriticalAssets, self.client.critical_assets().await, format_critical_assets)
    }

    pub async fn get_assets_by_region(&self, region_name: Option<&str>) -> String {
        match region_name {
            Some(region) => report(ApiOperation::AssetsByRegion, self.client.assets_in_region(region).await, |assets| {
                format_region_assets(region, assets)
            }),
            None => report(
                ApiOperation::AssetsByRegion,
                self.client.region_summaries().await,
                format_region_summaries,
            ),
        }
    }

    pub async fn get_active_projects(&self) -> String {
        report(ApiOperation::ActiveProjects, self.client.active_projects().await, format_active_projects)
    }

    pub async fn get_safety_inspections(&self, filter: &InspectionFilter) -> String {
        report(ApiOperation::SafetyInspections, self.client.safety_inspections(filter).await, |inspections| {
            format_safety_inspections(filter, inspections)
        })
    }

    pub async fn get_asset_statistics(&self) -> String {
        report(ApiOperation::AssetStatistics, self.client.asset_statistics().await, format_asset_statistics)
    }
}

fn report<T>(operation: ApiOperation, result: Result<Vec<T>>, render: impl FnOnce(&[T]) -> String) -> String {
    match result {
        Ok(rows) => render(&rows),
        Err(e) => {
            error!("Error getting {}: {}", operation.subject(), e);
            format!("Error getting {}: {}", operation.subject(), e)
        }
    }
}

#[async_trait]
impl KernelPlugin for ApiManagementPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn functions(&self) -> Vec<FunctionDefinition> {
        vec![
            FunctionDefinition::new("get_critical_assets", "Get information about critical infrastructure assets."),
            FunctionDefinition::new("get_assets_by_region", "Get infrastructure assets by region.").param(
                FunctionParameter::optional(
                    "region_name",
                    ParameterType::String,
                    "Optional name of the region to filter by. If not provided, summary for all regions will be returned.",
                ),
            ),
            FunctionDefinition::new("get_active_projects", "Get information about active maintenance projects."),
            FunctionDefinition::new(
                "get_safety_inspections",
                "Get safety inspection reports for infrastructure assets.",
            )
            .param(FunctionParameter::optional(
                "asset_type",
                ParameterType::String,
                "Type of asset to filter by (e.g., 'Bridge', 'Highway', 'Waterway')",
            ))
            .param(
                FunctionParameter::optional("min_safety_rating", ParameterType::Integer, "Minimum safety rating (1-5)")
                    .with_default(json!(1)),
            )
            .param(
                FunctionParameter::optional("max_safety_rating", ParameterType::Integer, "Maximum safety rating (1-5)")
                    .with_default(json!(5)),
            ),
            FunctionDefinition::new("get_asset_statistics", "Get statistical overview of infrastructure assets."),
        ]
    }

    async fn invoke(&self, function: &str, arguments: &Value) -> Result<String> {
        info!("{} invoking {}", Self::NAME, function);
        let output = match function {
            "get_critical_assets" => self.get_critical_assets().await,
            "get_assets_by_region" => {
                let region = string_arg(arguments, "region_name");
                self.get_assets_by_region(region.as_deref()).await
            }
            "get_active_projects" => self.get_active_projects().await,
            "get_safety_inspections" => {
                let filter = InspectionFilter {
                    asset_type: string_arg(arguments, "asset_type"),
                    min_safety_rating: int_arg(arguments, "min_safety_rating", 1),
                    max_safety_rating: int_arg(arguments, "max_safety_rating", 5),
                };
                self.get_safety_inspections(&filter).await
            }
            "get_asset_statistics" => self.get_asset_statistics().await,
            other => {
                return Err(WorkshopError::Plugin(format!(
                    "{} has no function '{}'",
                    Self::NAME,
                    other
                )))
            }
        };
        Ok(output)
    }
}

// Report formatting

const NOT_AVAILABLE: &str = "Not Available";

fn or_not_available<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(T::to_string).unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// Euro amount with thousands separators and two decimals, e.g. `€1,250,000.00`.
pub fn format_euros(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}€{}.{:02}", sign, grouped, cents % 100)
}

pub fn format_critical_assets(assets: &[CriticalAsset]) -> String {
    if assets.is_empty() {
        return "No critical assets found.".to_string();
    }
    let entries: Vec<String> = assets
        .iter()
        .map(|a| {
            format!(
                "Asset: {} ({})\nRegion: {}\nStatus: {}\nSafety Rating: {}/5\nLast Inspection: {}\n",
                a.asset_name,
                a.asset_type,
                a.region_name,
                a.status,
                or_not_available(&a.safety_rating),
                or_not_available(&a.inspection_date),
            )
        })
        .collect();
    format!("\nCritical Assets Report:\n\n{}", entries.join("\n"))
}

pub fn format_region_assets(region_name: &str, assets: &[RegionAsset]) -> String {
    if assets.is_empty() {
        return "No assets found for the specified criteria.".to_string();
    }
    let entries: Vec<String> = assets
        .iter()
        .map(|a| {
            format!(
                "Asset: {}\nType: {}\nStatus: {}\nConstruction Year: {}\nLast Major Maintenance: {}\nSafety Rating: {}\nLast Inspection: {}\n",
                a.asset_name,
                a.asset_type,
                a.status,
                a.construction_year,
                or_not_available(&a.last_major_maintenance),
                or_not_available(&a.safety_rating),
                or_not_available(&a.inspection_date),
            )
        })
        .collect();
    format!("\nInfrastructure Assets in {}:\n\n{}", region_name, entries.join("\n"))
}

pub fn format_region_summaries(regions: &[RegionSummary]) -> String {
    if regions.is_empty() {
        return "No assets found for the specified criteria.".to_string();
    }
    let entries: Vec<String> = regions
        .iter()
        .map(|r| {
            let average = r
                .avg_safety_rating
                .map(|avg| format!("{:.1}/5", avg))
                .unwrap_or_else(|| NOT_AVAILABLE.to_string());
            format!(
                "Region: {}\nTotal Assets: {}\nCritical Assets: {}\nUnder Maintenance: {}\nAverage Safety Rating: {}\n",
                r.region_name, r.total_assets, r.critical_assets, r.under_maintenance, average,
            )
        })
        .collect();
    format!("\nRegional Infrastructure Summary:\n\n{}", entries.join("\n"))
}

pub fn format_active_projects(projects: &[ActiveProject]) -> String {
    if projects.is_empty() {
        return "No active maintenance projects found.".to_string();
    }
    let entries: Vec<String> = projects
        .iter()
        .map(|p| {
            format!(
                "Project: {}\nType: {}\nAsset: {} ({})\nRegion: {}\nPriority: {}\nStatus: {}\nTimeline: {} to {}\nBudget: {}\n",
                p.project_name,
                p.project_type,
                p.asset_name,
                p.asset_type,
                p.region_name,
                p.priority,
                p.status,
                p.start_date,
                p.end_date,
                format_euros(p.budget),
            )
        })
        .collect();
    format!("\nActive Maintenance Projects:\n\n{}", entries.join("\n"))
}

pub fn format_safety_inspections(filter: &InspectionFilter, inspections: &[InspectionReport]) -> String {
    if inspections.is_empty() {
        return "No safety inspections found matching the criteria.".to_string();
    }
    let entries: Vec<String> = inspections
        .iter()
        .map(|i| {
            format!(
                "Asset: {} ({})\nRegion: {}\nInspection Date: {}\nType: {}\nSafety Rating: {}/5\nFindings: {}\nRecommended Actions: {}\n",
                i.asset_name,
                i.asset_type,
                i.region_name,
                i.inspection_date,
                i.inspection_type,
                i.safety_rating,
                or_not_available(&i.findings),
                or_not_available(&i.recommended_actions),
            )
        })
        .collect();

    let mut header = "\nSafety Inspection Reports".to_string();
    if let Some(asset_type) = &filter.asset_type {
        header.push_str(&format!(" for {}s", asset_type));
    }
    header.push_str(&format!(
        " (Safety Rating: {}-{}):\n",
        filter.min_safety_rating, filter.max_safety_rating
    ));
    header + &entries.join("\n")
}

pub fn format_asset_statistics(stats: &[AssetStatistics]) -> String {
    if stats.is_empty() {
        return "No asset statistics available.".to_string();
    }
    let entries: Vec<String> = stats
        .iter()
        .map(|s| {
            format!(
                "Asset Type: {}\nTotal Assets: {}\nAverage Age: {:.1} years\nStatus Breakdown:\n  - Critical: {}\n  - Under Maintenance: {}\n  - Operational: {}\n",
                s.asset_type,
                s.total_assets,
                s.avg_age,
                s.critical_count,
                s.under_maintenance_count,
                s.operational_count,
            )
        })
        .collect();
    format!("\nInfrastructure Asset Statistics:\n\n{}", entries.join("\n"))
}
