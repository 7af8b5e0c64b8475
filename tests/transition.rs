//! Upgraded input files must be plannable as they are written.

use epbatch::config::RunConfig;
use epbatch::dispatch::DispatchError;
use epbatch::jobs::dimensions::Vintage;
use epbatch::plan::build_plan;
use epbatch::transition::{plan_conversions, run_conversions, steps, TransitionStep, TransitionTool};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Rewrites the version object the way the updater does.
struct RewritingTool;

impl TransitionTool for RewritingTool {
    fn apply(&self, step: &TransitionStep, file: &Path) -> Result<(), DispatchError> {
        fs::write(file, format!("Version,{};\n", step.to)).unwrap();
        Ok(())
    }
}

#[test]
fn test_converted_files_enter_the_plan() {
    let dir = tempfile::tempdir().unwrap();
    let group = dir
        .path()
        .join("eplus_simulations/pre1980/idf_files/v7_2/4a_pre1980_v7_2");
    fs::create_dir_all(&group).unwrap();
    for b in ["RefBldgHospitalPre1980", "RefBldgWarehousePre1980"] {
        fs::write(
            group.join(format!("{}_v1.4_7.2_4A_USA_MD_BALTIMORE.idf", b)),
            "Version,7.2;\n",
        )
        .unwrap();
    }

    let config = RunConfig {
        project_root: dir.path().to_path_buf(),
        vintages: vec![Vintage::Pre1980],
        ..RunConfig::default()
    };
    let zones = vec!["4a".to_string()];
    let chain = steps(
        &config.transition.source_version,
        &config.transition.target_version,
    )
    .unwrap();

    let tasks = plan_conversions(&config.project_root, &config.transition, &config.vintages, &zones)
        .unwrap();
    assert_eq!(tasks.len(), 2);
    let records = run_conversions(&tasks, 2, &chain, &RewritingTool, false).unwrap();
    assert!(records.iter().all(|r| !r.failed()));
    for task in &tasks {
        assert!(task.file_name().contains("_V22-2-0_4A_"));
        assert!(task.destination.exists());
    }

    let plan = build_plan(&config, 2, false).unwrap();
    // 2 files x 13 scenario years
    assert_eq!(plan.total_jobs(), 26);
    let buildings: BTreeSet<&str> = plan
        .assessments
        .iter()
        .map(|a| a.job.key.building_type())
        .collect();
    assert_eq!(
        buildings.into_iter().collect::<Vec<_>>(),
        vec!["RefBldgHospital", "RefBldgWarehouse"]
    );
    assert!(plan
        .assessments
        .iter()
        .all(|a| a.job.version == "v22_2" && a.job.key.climate_zone() == "4a"));

    // A second pass finds nothing left to convert.
    assert!(plan_conversions(&config.project_root, &config.transition, &config.vintages, &zones)
        .unwrap()
        .is_empty());
}
