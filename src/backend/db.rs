use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

use crate::config::BackendConfig;
use crate::error::{Result, WorkshopError};
use crate::models::{
    ActiveProject, AssetStatistics, CriticalAsset, InfrastructureAsset, InspectionFilter,
    InspectionReport, MaintenanceProject, Region, RegionAsset, RegionSummary, SafetyInspection,
};

const SCHEMA: &str = include_str!("schema.sql");
const SEED: &str = include_str!("seed.sql");

/// Read access to the infrastructure tables and views.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(config: &BackendConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| WorkshopError::Config(format!("Invalid database url '{}': {}", config.database_url, e)))?
            .create_if_missing(true)
            .foreign_keys(true);

        // every connection to an in-memory database is a separate database
        let in_memory = config.database_url.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new();
        pool_options = if in_memory {
            pool_options.max_connections(1).idle_timeout(None).max_lifetime(None)
        } else {
            pool_options.max_connections(config.max_connections)
        };

        let pool = pool_options.connect_with(options).await?;
        info!("Connected to database {}", config.database_url);

        let db = Self { pool };
        db.migrate().await?;
        if config.seed_demo_data {
            db.seed_if_empty().await?;
        }
        Ok(db)
    }

    /// In-memory database with schema and demo rows.
    pub async fn in_memory() -> Result<Self> {
        Self::connect(&BackendConfig::default()).await
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        debug!("Schema applied");
        Ok(())
    }

    /// Insert the demo rows unless the regions table already has data.
    pub async fn seed_if_empty(&self) -> Result<bool> {
        let regions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM Regions")
            .fetch_one(&self.pool)
            .await?;
        if regions > 0 {
            debug!("Database already seeded ({} regions)", regions);
            return Ok(false);
        }

        let mut tx = self.pool.begin().await?;
        sqlx::raw_sql(SEED).execute(&mut *tx).await?;
        tx.commit().await?;

        info!("Seeded demo infrastructure data");
        Ok(true)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn critical_assets(&self) -> Result<Vec<CriticalAsset>> {
        let rows = sqlx::query_as::<_, CriticalAsset>(
            "SELECT AssetID, AssetName, AssetType, RegionName, Status, SafetyRating, \
                    InspectionDate, Findings, RecommendedActions \
             FROM vw_CriticalAssets \
             ORDER BY SafetyRating ASC, InspectionDate DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn assets_in_region(&self, region_name: &str) -> Result<Vec<RegionAsset>> {
        let rows = sqlx::query_as::<_, RegionAsset>(
            "SELECT r.RegionName, a.AssetType, a.AssetName, a.Status, a.ConstructionYear, \
                    a.LastMajorMaintenance, i.SafetyRating, i.InspectionDate \
             FROM InfrastructureAssets a \
                 JOIN Regions r ON a.RegionID = r.RegionID \
                 LEFT JOIN vw_LatestInspections i ON a.AssetID = i.AssetID \
             WHERE r.RegionName = ?1 \
             ORDER BY a.Status DESC, i.SafetyRating ASC",
        )
        .bind(region_name)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn region_summaries(&self) -> Result<Vec<RegionSummary>> {
        let rows = sqlx::query_as::<_, RegionSummary>(
            "SELECT r.RegionName, \
                    COUNT(a.AssetID) AS TotalAssets, \
                    SUM(CASE WHEN a.Status = 'Critical' THEN 1 ELSE 0 END) AS CriticalAssets, \
                    SUM(CASE WHEN a.Status = 'Under Maintenance' THEN 1 ELSE 0 END) AS UnderMaintenance, \
                    AVG(CAST(i.SafetyRating AS REAL)) AS AvgSafetyRating \
             FROM InfrastructureAssets a \
                 JOIN Regions r ON a.RegionID = r.RegionID \
                 LEFT JOIN vw_LatestInspections i ON a.AssetID = i.AssetID \
             GROUP BY r.RegionName \
             ORDER BY CriticalAssets DESC, AvgSafetyRating ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn active_projects(&self) -> Result<Vec<ActiveProject>> {
        let rows = sqlx::query_as::<_, ActiveProject>(
            "SELECT ProjectID, ProjectName, ProjectType, AssetName, AssetType, RegionName, \
                    Priority, Status, StartDate, EndDate, Budget \
             FROM vw_ActiveProjects \
             ORDER BY CASE Priority WHEN 'High' THEN 0 WHEN 'Medium' THEN 1 ELSE 2 END, StartDate ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn safety_inspections(&self, filter: &InspectionFilter) -> Result<Vec<InspectionReport>> {
        let rows = sqlx::query_as::<_, InspectionReport>(
            "SELECT i.InspectionID, a.AssetName, a.AssetType, r.RegionName, i.InspectionDate, \
                    i.InspectionType, i.SafetyRating, i.Findings, i.RecommendedActions \
             FROM SafetyInspections i \
                 JOIN InfrastructureAssets a ON i.AssetID = a.AssetID \
                 JOIN Regions r ON a.RegionID = r.RegionID \
             WHERE i.SafetyRating BETWEEN ?1 AND ?2 \
               AND (?3 IS NULL OR a.AssetType = ?3) \
             ORDER BY i.InspectionDate DESC, i.SafetyRating ASC",
        )
        .bind(filter.min_safety_rating)
        .bind(filter.max_safety_rating)
        .bind(filter.asset_type.as_deref())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn asset_statistics(&self) -> Result<Vec<AssetStatistics>> {
        let rows = sqlx::query_as::<_, AssetStatistics>(
            "SELECT AssetType, \
                    COUNT(*) AS TotalAssets, \
                    AVG(CAST(strftime('%Y', 'now') AS INTEGER) - ConstructionYear) AS AvgAge, \
                    SUM(CASE WHEN Status = 'Critical' THEN 1 ELSE 0 END) AS CriticalCount, \
                    SUM(CASE WHEN Status = 'Under Maintenance' THEN 1 ELSE 0 END) AS UnderMaintenanceCount, \
                    SUM(CASE WHEN Status = 'Operational' THEN 1 ELSE 0 END) AS OperationalCount \
             FROM InfrastructureAssets \
             GROUP BY AssetType \
             ORDER BY TotalAssets DESC, AssetType ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn regions(&self) -> Result<Vec<Region>> {
        let rows = sqlx::query_as::<_, Region>(
            "SELECT RegionID, RegionName, RegionalDirector, OfficeLocation FROM Regions ORDER BY RegionID",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn assets(&self) -> Result<Vec<InfrastructureAsset>> {
        let rows = sqlx::query_as::<_, InfrastructureAsset>(
            "SELECT AssetID, AssetName, AssetType, ConstructionYear, LastMajorMaintenance, Status, RegionID \
             FROM InfrastructureAssets ORDER BY AssetID",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn projects(&self) -> Result<Vec<MaintenanceProject>> {
        let rows = sqlx::query_as::<_, MaintenanceProject>(
            "SELECT ProjectID, AssetID, ProjectName, ProjectType, StartDate, EndDate, Budget, Status, Priority \
             FROM MaintenanceProjects ORDER BY ProjectID",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn inspections(&self) -> Result<Vec<SafetyInspection>> {
        let rows = sqlx::query_as::<_, SafetyInspection>(
            "SELECT InspectionID, AssetID, InspectionDate, InspectorName, InspectionType, SafetyRating, \
                    Findings, RecommendedActions \
             FROM SafetyInspections ORDER BY InspectionID",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashMap};

    // Same thresholds as vw_CriticalAssets.
    const STATUS_CRITICAL: &str = "Critical";
    const CRITICAL_RATING_THRESHOLD: i64 = 2;

    #[tokio::test]
    async fn test_seed_runs_once() {
        let db = Database::in_memory().await.unwrap();
        assert!(!db.seed_if_empty().await.unwrap());

        assert_eq!(db.regions().await.unwrap().len(), 4);
        assert_eq!(db.assets().await.unwrap().len(), 13);
        assert_eq!(db.projects().await.unwrap().len(), 8);
        assert_eq!(db.inspections().await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_unseeded_database_is_empty() {
        let config = BackendConfig {
            seed_demo_data: false,
            ..BackendConfig::default()
        };
        let db = Database::connect(&config).await.unwrap();
        assert!(db.assets().await.unwrap().is_empty());
        assert!(db.critical_assets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_critical_assets_match_view_definition() {
        let db = Database::in_memory().await.unwrap();

        let mut latest: HashMap<i64, SafetyInspection> = HashMap::new();
        for inspection in db.inspections().await.unwrap() {
            let newer = latest
                .get(&inspection.asset_id)
                .map_or(true, |current| inspection.inspection_date > current.inspection_date);
            if newer {
                latest.insert(inspection.asset_id, inspection);
            }
        }

        let expected: BTreeSet<i64> = db
            .assets()
            .await
            .unwrap()
            .into_iter()
            .filter(|asset| {
                asset.status == STATUS_CRITICAL
                    || latest
                        .get(&asset.asset_id)
                        .map_or(false, |i| i.safety_rating <= CRITICAL_RATING_THRESHOLD)
            })
            .map(|asset| asset.asset_id)
            .collect();

        let critical = db.critical_assets().await.unwrap();
        let actual: BTreeSet<i64> = critical.iter().map(|a| a.asset_id).collect();

        assert_eq!(actual, expected);
        assert_eq!(actual, BTreeSet::from([4, 8, 9, 10, 13]));
        assert_eq!(critical.len(), actual.len());

        // an old low rating followed by a good one does not count
        assert!(!actual.contains(&2));

        // critical asset without any inspection is listed with no rating
        let ketelbrug = critical.iter().find(|a| a.asset_id == 13).unwrap();
        assert_eq!(ketelbrug.safety_rating, None);

        let brienenoord = critical.iter().find(|a| a.asset_id == 4).unwrap();
        assert_eq!(brienenoord.safety_rating, Some(1));
        assert_eq!(brienenoord.inspection_date.as_deref(), Some("2024-03-02"));
    }

    #[tokio::test]
    async fn test_assets_in_region_use_latest_inspection() {
        let db = Database::in_memory().await.unwrap();

        let assets = db.assets_in_region("Noord-Holland").await.unwrap();
        assert_eq!(assets.len(), 4);
        assert!(assets.iter().all(|a| a.region_name == "Noord-Holland"));

        let coentunnel = assets.iter().find(|a| a.asset_name == "Coentunnel").unwrap();
        assert_eq!(coentunnel.safety_rating, Some(4));
        assert_eq!(coentunnel.inspection_date.as_deref(), Some("2024-01-25"));

        assert!(db.assets_in_region("Friesland").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_region_summaries() {
        let db = Database::in_memory().await.unwrap();
        let summaries = db.region_summaries().await.unwrap();
        assert_eq!(summaries.len(), 4);

        let total: i64 = summaries.iter().map(|s| s.total_assets).sum();
        assert_eq!(total, 13);

        let zeeland = summaries.iter().find(|s| s.region_name == "Zeeland").unwrap();
        assert_eq!(zeeland.total_assets, 3);
        assert_eq!(zeeland.critical_assets, 1);
        assert_eq!(zeeland.under_maintenance, 0);
        let avg = zeeland.avg_safety_rating.unwrap();
        assert!((avg - 8.0 / 3.0).abs() < 1e-9);

        // ordered by critical count, most critical first
        assert!(summaries.windows(2).all(|w| w[0].critical_assets >= w[1].critical_assets));
    }

    #[tokio::test]
    async fn test_active_projects_exclude_completed() {
        let db = Database::in_memory().await.unwrap();
        let projects = db.active_projects().await.unwrap();

        assert_eq!(projects.len(), 6);
        assert!(projects.iter().all(|p| p.status == "Planned" || p.status == "In Progress"));
        assert_eq!(projects[0].priority, "High");
        assert_eq!(projects[0].project_name, "Afsluitdijk Reinforcement");
        assert_eq!(projects.last().unwrap().priority, "Medium");
    }

    #[tokio::test]
    async fn test_safety_inspection_filters() {
        let db = Database::in_memory().await.unwrap();

        let all = db.safety_inspections(&InspectionFilter::default()).await.unwrap();
        assert_eq!(all.len(), 16);
        assert!(all.windows(2).all(|w| w[0].inspection_date >= w[1].inspection_date));

        let low_bridges = db
            .safety_inspections(&InspectionFilter {
                asset_type: Some("Bridge".to_string()),
                min_safety_rating: 1,
                max_safety_rating: 2,
            })
            .await
            .unwrap();
        assert_eq!(low_bridges.len(), 4);
        assert!(low_bridges.iter().all(|i| i.asset_type == "Bridge" && i.safety_rating <= 2));

        let none = db
            .safety_inspections(&InspectionFilter {
                asset_type: None,
                min_safety_rating: 4,
                max_safety_rating: 3,
            })
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_asset_statistics() {
        let db = Database::in_memory().await.unwrap();
        let stats = db.asset_statistics().await.unwrap();

        let bridges = stats.iter().find(|s| s.asset_type == "Bridge").unwrap();
        assert_eq!(bridges.total_assets, 4);
        assert_eq!(bridges.critical_count, 3);
        assert_eq!(bridges.operational_count, 1);
        assert_eq!(bridges.under_maintenance_count, 0);
        assert!(bridges.avg_age > 40.0);

        assert_eq!(stats[0].asset_type, "Bridge");
        let total: i64 = stats.iter().map(|s| s.total_assets).sum();
        assert_eq!(total, 13);
    }
}
