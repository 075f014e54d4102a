//! End-to-end pipeline tests over small synthetic surveys

use geocorr_core::classify::ConsistencyOrder;
use geocorr_core::config::PipelineSettings;
use geocorr_core::models::{MatchPosition, MergedResult, PipelineParams, StageCounts, TestType};
use geocorr_core::schema::TablePurpose;
use geocorr_core::table::{read_csv, write_csv, RawTable};
use geocorr_merge::{InputTable, Pipeline};
use geocorr_store::{CacheService, DiskTier};
use std::sync::Arc;
use tempfile::TempDir;

fn raw(name: &str, headers: &[&str], rows: Vec<Vec<String>>) -> RawTable {
    RawTable::new(name, headers.iter().map(|h| h.to_string()).collect(), rows)
}

fn row(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

/// Line L1 runs from (0, 0) to (100, 0) with a station every 10 m and
/// samples at RL 99, 97, 95 and 93; velocity grows with depth.
fn geophysics() -> RawTable {
    let mut rows = Vec::new();
    for station in 0..=10 {
        let x = (station * 10) as f64;
        for rl in [99.0, 97.0, 95.0, 93.0] {
            let velocity = 200.0 + (100.0 - rl) * 50.0;
            rows.push(vec![
                "L1".to_string(),
                x.to_string(),
                "0".to_string(),
                rl.to_string(),
                velocity.to_string(),
            ]);
        }
    }
    raw("survey", &["Line", "Easting", "Northing", "RL", "Vs (m/s)"], rows)
}

/// BH1 sits 10 m left of chainage 40, BH3 3 m past the end, BH2 too far
/// past the end and BH4 30 m off the line
fn boreholes() -> RawTable {
    raw(
        "boreholes",
        &["Hole ID", "Easting", "Northing", "Collar RL", "From", "To", "Consistency", "Geology"],
        vec![
            row(&["BH1", "40", "10", "100", "0", "2", "F", "Fill"]),
            row(&["BH1", "40", "10", "100", "2", "5", "Stiff", "Clay"]),
            row(&["BH1", "40", "10", "100", "5", "9", "H", "Clay"]),
            row(&["BH2", "120", "5", "100", "0", "3", "St", ""]),
            row(&["BH3", "103", "-4", "", "0", "1", "VSt", ""]),
            row(&["BH4", "50", "30", "100", "0", "3", "St", ""]),
        ],
    )
}

fn lab() -> RawTable {
    raw(
        "lab",
        &["Hole", "Sample Depth", "Test", "Result"],
        vec![row(&["BH1", "3", "UCS", "150"]), row(&["BH1", "20", "SPT N", "45"])],
    )
}

fn inputs() -> Vec<InputTable> {
    vec![
        InputTable::new(TablePurpose::Geophysics, geophysics()),
        InputTable::new(TablePurpose::BoreholeInterpretation, boreholes()),
        InputTable::new(TablePurpose::LabSummary, lab()),
    ]
}

fn pipeline() -> Pipeline {
    Pipeline::new(Arc::new(CacheService::in_memory()), PipelineSettings::default())
}

#[tokio::test]
async fn test_full_run_registers_and_merges() {
    let pipeline = pipeline();
    let context = pipeline.run(PipelineParams::default(), inputs()).await.unwrap();

    let holes: Vec<&str> = context.registrations().iter().map(|r| r.hole_id.as_str()).collect();
    assert_eq!(holes, vec!["BH1", "BH3"]);

    let bh1 = &context.registrations()[0];
    assert!((bh1.chainage - 40.0).abs() < 1e-9);
    assert!((bh1.offset - 10.0).abs() < 1e-9);
    assert_eq!(bh1.position, MatchPosition::WithinLine);

    let bh3 = &context.registrations()[1];
    assert_eq!(bh3.position, MatchPosition::AfterEnd);
    assert!((bh3.overrun - 3.0).abs() < 1e-9);

    // BH1 at station 40: F reads layer 99..97, Stiff layers 99..97 and
    // 97..95, H layer 95..93
    let merged = context.merged();
    assert_eq!(merged.len(), 4);
    let stiff = merged.iter().find(|m| m.consistency == "Stiff").unwrap();
    assert_eq!(stiff.sample_count, 2);
    assert!((stiff.velocity_mean - 300.0).abs() < 1e-9);
    let hard = merged.iter().find(|m| m.consistency == "H").unwrap();
    assert_eq!(hard.sample_count, 1);
    assert!((hard.velocity_mean - 450.0).abs() < 1e-9);
    assert_eq!(stiff.geology.as_deref(), Some("Clay"));

    // BH3 has no collar RL and reads the samples at the line end
    let bh3_rows: Vec<&MergedResult> = merged.iter().filter(|m| m.hole_id == "BH3").collect();
    assert_eq!(bh3_rows.len(), 1);
    assert_eq!(bh3_rows[0].top_rl, 99.0);
    assert!((bh3_rows[0].velocity_mean - 250.0).abs() < 1e-9);

    assert_eq!(context.consistency_counts(), StageCounts { total: 2, matched: 2, unmatched: 0 });

    let with_lab: Vec<_> = context.lab_merged().iter().filter(|r| r.lab_matched).collect();
    assert_eq!(with_lab.len(), 1);
    assert_eq!(with_lab[0].consistency, "Stiff");
    assert_eq!(with_lab[0].test_type, Some(TestType::Ucs));
    assert_eq!(with_lab[0].lab_value, Some(150.0));
    assert_eq!(context.lab_merged().len(), 4);
    assert_eq!(context.lab_counts(), StageCounts { total: 2, matched: 1, unmatched: 1 });
}

fn reordered(table: &RawTable, order: &[usize]) -> RawTable {
    let rows = order.iter().map(|&i| table.rows[i].clone()).collect();
    RawTable::new(table.name.clone(), table.headers.clone(), rows)
}

#[tokio::test]
async fn test_row_order_does_not_change_output_tables() {
    let lab = raw(
        "lab",
        &["Hole", "Sample Depth", "Test", "Result"],
        vec![
            row(&["BH1", "3", "UCS", "150"]),
            row(&["BH1", "3", "SPT N", "22"]),
            row(&["BH1", "0.5", "LL", "41"]),
            row(&["BH1", "6", "UCS", "480"]),
            row(&["BH3", "0.5", "SPT N", "12"]),
            row(&["BH1", "20", "SPT N", "45"]),
        ],
    );
    let holes = boreholes();

    let run = |holes: RawTable, lab: RawTable| async move {
        let tables = vec![
            InputTable::new(TablePurpose::Geophysics, geophysics()),
            InputTable::new(TablePurpose::BoreholeInterpretation, holes),
            InputTable::new(TablePurpose::LabSummary, lab),
        ];
        pipeline().run(PipelineParams::default(), tables).await.unwrap()
    };

    let baseline = run(holes.clone(), lab.clone()).await;
    assert_eq!(baseline.lab_merged().iter().filter(|r| r.lab_matched).count(), 5);

    for (hole_order, lab_order) in [
        (vec![5, 4, 3, 2, 1, 0], vec![5, 4, 3, 2, 1, 0]),
        (vec![2, 0, 4, 1, 5, 3], vec![3, 1, 5, 0, 4, 2]),
    ] {
        let shuffled = run(reordered(&holes, &hole_order), reordered(&lab, &lab_order)).await;
        assert_eq!(shuffled.registrations(), baseline.registrations());
        assert_eq!(shuffled.merged(), baseline.merged());
        assert_eq!(shuffled.lab_merged(), baseline.lab_merged());
        assert_eq!(shuffled.lab_counts(), baseline.lab_counts());
    }
}

#[tokio::test]
async fn test_ucs_on_stiff_under_order_override() {
    let params = PipelineParams {
        consistency_order: ConsistencyOrder::with_override(&["Hard", "Stiff", "F"]).unwrap(),
        ..Default::default()
    };
    let context = pipeline().run(params, inputs()).await.unwrap();

    // BH1 logs "Stiff" by name; the override lists it by name as well
    let stiff = context.merged().iter().find(|m| m.consistency == "Stiff").unwrap();
    assert_eq!(stiff.consistency_rank, 1);
    assert!(context.unknown_labels().is_empty());

    let ucs: Vec<_> = context.lab_merged().iter().filter(|r| r.test_type == Some(TestType::Ucs)).collect();
    assert_eq!(ucs.len(), 1);
    assert_eq!(ucs[0].consistency, "Stiff");
    assert_eq!(ucs[0].consistency_rank, 1);
    assert_eq!(ucs[0].lab_value, Some(150.0));
    assert!((ucs[0].velocity_mean - 300.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_unmatched_lab_records_raise_quality_warning() {
    let pipeline = pipeline();
    let context = pipeline.run(PipelineParams::default(), inputs()).await.unwrap();

    assert_eq!(context.warnings().len(), 1);
    let warning = &context.warnings()[0];
    assert_eq!(warning.stage, "lab_merge");
    assert_eq!((warning.unmatched, warning.total), (1, 2));
    assert!((warning.ratio - 0.5).abs() < 1e-12);

    let summary = pipeline.summary(&context).await;
    assert_eq!(summary.warnings, context.warnings().to_vec());
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["lab_counts"]["unmatched"], 1);
}

#[tokio::test]
async fn test_second_run_reads_everything_from_cache() {
    let pipeline = pipeline();
    let first = pipeline.run(PipelineParams::default(), inputs()).await.unwrap();
    let computed = pipeline.cache().report().await.computations;

    let second = pipeline.run(PipelineParams::default(), inputs()).await.unwrap();
    let report = pipeline.cache().report().await;

    assert_eq!(report.computations, computed);
    assert!(report.memory_hits >= computed);
    assert_eq!(first.registrations(), second.registrations());
    assert_eq!(first.merged(), second.merged());
    assert_eq!(first.lab_merged(), second.lab_merged());
    assert_ne!(first.run_id(), second.run_id());
}

#[tokio::test]
async fn test_parameter_change_recomputes() {
    let pipeline = pipeline();
    let narrow = pipeline.run(PipelineParams::default(), inputs()).await.unwrap();
    let computed = pipeline.cache().report().await.computations;

    let params = PipelineParams { perpendicular_threshold: 35.0, ..Default::default() };
    let wide = pipeline.run(params, inputs()).await.unwrap();

    assert!(pipeline.cache().report().await.computations > computed);
    assert!(!narrow.registrations().iter().any(|r| r.hole_id == "BH4"));
    assert!(wide.registrations().iter().any(|r| r.hole_id == "BH4"));
}

#[tokio::test]
async fn test_broken_table_is_isolated() {
    let broken = raw("broken_holes", &["Hole ID", "Easting", "Northing"], vec![row(&["BH9", "1", "1"])]);
    let mut tables = inputs();
    tables.push(InputTable::new(TablePurpose::BoreholeInterpretation, broken));

    let pipeline = pipeline();
    let context = pipeline.run(PipelineParams::default(), tables).await.unwrap();

    assert_eq!(context.failures().len(), 1);
    assert_eq!(context.failures()[0].input, "broken_holes");
    assert!(context.failures()[0].error.contains("Schema error"));
    assert_eq!(context.inputs().len(), 3);
    assert_eq!(context.registrations().len(), 2);
}

#[tokio::test]
async fn test_disk_cache_serves_a_new_session() {
    let dir = TempDir::new().unwrap();

    let first = {
        let cache = CacheService::with_disk(DiskTier::open(dir.path(), 1 << 24).await.unwrap());
        let pipeline = Pipeline::new(Arc::new(cache), PipelineSettings::default());
        pipeline.run(PipelineParams::default(), inputs()).await.unwrap()
    };

    let cache = CacheService::with_disk(DiskTier::open(dir.path(), 1 << 24).await.unwrap());
    let pipeline = Pipeline::new(Arc::new(cache), PipelineSettings::default());
    let second = pipeline.run(PipelineParams::default(), inputs()).await.unwrap();

    let report = pipeline.cache().report().await;
    assert_eq!(report.computations, 0);
    assert!(report.disk_hits > 0);
    assert_eq!(first.merged(), second.merged());
    assert_eq!(first.lab_merged(), second.lab_merged());
}

#[tokio::test]
async fn test_merged_table_survives_csv_export() {
    let pipeline = pipeline();
    let context = pipeline.run(PipelineParams::default(), inputs()).await.unwrap();

    let mut buffer = Vec::new();
    write_csv(context.merged(), &mut buffer).unwrap();
    let header = String::from_utf8(buffer.clone()).unwrap();
    assert!(header.starts_with("line_id,hole_id,chainage,offset,position"));

    let restored: Vec<MergedResult> = read_csv(buffer.as_slice()).unwrap();
    assert_eq!(restored.len(), context.merged().len());
    for (a, b) in restored.iter().zip(context.merged()) {
        assert_eq!(a.hole_id, b.hole_id);
        assert_eq!(a.consistency, b.consistency);
        assert_eq!(a.geology, b.geology);
        assert_eq!(a.position, b.position);
        assert!((a.chainage - b.chainage).abs() < 1e-6);
        assert!((a.offset - b.offset).abs() < 1e-6);
        assert!((a.velocity_mean - b.velocity_mean).abs() < 1e-6);
        assert_eq!(a.velocity_std.is_some(), b.velocity_std.is_some());
    }
}
