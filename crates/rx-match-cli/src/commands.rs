use std::fs;
use std::io;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::info;

use rx_match_core::{
    CatalogCandidate, Database, MatchReport, MatcherConfig, OcrExtraction, PrescriptionMatcher,
};

use crate::cli::{ImportArgs, MatchArgs, SearchArgs};

/// Load matcher configuration, falling back to defaults.
pub fn load_config(path: Option<&Path>) -> Result<MatcherConfig> {
    match path {
        Some(path) => MatcherConfig::from_file(path)
            .with_context(|| format!("load config {}", path.display())),
        None => Ok(MatcherConfig::default()),
    }
}

pub fn run_import(db_path: &Path, args: &ImportArgs) -> Result<usize> {
    let text = fs::read_to_string(&args.catalog)
        .with_context(|| format!("read {}", args.catalog.display()))?;
    let products: Vec<CatalogCandidate> =
        serde_json::from_str(&text).context("parse catalog JSON")?;

    let mut db = open_db(db_path)?;
    let count = db.import_products(&products).context("import products")?;
    info!(count, db = %db_path.display(), "Imported products");
    Ok(count)
}

pub fn run_search(db_path: &Path, args: &SearchArgs) -> Result<Vec<CatalogCandidate>> {
    let db = open_db(db_path)?;
    let products = db
        .search_products(&args.query, args.limit)
        .context("search catalog")?;
    Ok(products)
}

pub fn run_match(db_path: &Path, config: MatcherConfig, args: &MatchArgs) -> Result<MatchReport> {
    let extraction = read_extraction(args)?;
    let db = open_db(db_path)?;
    if db.count_active_products()? == 0 {
        bail!(
            "catalog {} has no active products; run `rx-match import` first",
            db_path.display()
        );
    }

    let matcher = PrescriptionMatcher::with_config(&db, config);
    let summary = matcher
        .process_extraction(&extraction)
        .context("match prescription")?;
    Ok(MatchReport::new(summary))
}

fn read_extraction(args: &MatchArgs) -> Result<OcrExtraction> {
    if !args.names.is_empty() {
        return Ok(OcrExtraction {
            medicine_names: args.names.clone(),
            confidence: args.ocr_confidence,
            raw_text: args.names.join("\n"),
            patient_info: None,
        });
    }

    let Some(input) = &args.input else {
        bail!("provide an OCR JSON file or at least one --name");
    };
    let text = if input.as_os_str() == "-" {
        io::read_to_string(io::stdin()).context("read OCR JSON from stdin")?
    } else {
        fs::read_to_string(input).with_context(|| format!("read {}", input.display()))?
    };
    OcrExtraction::from_json(&text).context("parse OCR JSON")
}

fn open_db(path: &Path) -> Result<Database> {
    Database::open(path).with_context(|| format!("open catalog {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_catalog(dir: &Path) -> PathBuf {
        let path = dir.join("catalog.json");
        fs::write(
            &path,
            r#"[
                {"id": "PCM500", "name": "Paracetamol 500mg", "genericName": "Paracetamol", "price": 25.0, "inStock": true},
                {"id": "ASP100", "name": "Aspirin 100mg", "price": 12.5, "inStock": true}
            ]"#,
        )
        .unwrap();
        path
    }

    #[test]
    fn test_import_search_match() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("rx.db");
        let catalog = write_catalog(dir.path());

        let count = run_import(&db_path, &ImportArgs { catalog }).unwrap();
        assert_eq!(count, 2);

        let found = run_search(
            &db_path,
            &SearchArgs {
                query: "aspirin".into(),
                limit: 15,
            },
        )
        .unwrap();
        assert_eq!(found.len(), 1);

        let report = run_match(
            &db_path,
            MatcherConfig::immediate(),
            &MatchArgs {
                input: None,
                names: vec!["Paracetamol 500mg".into(), "Aspirin 100mg".into()],
                ocr_confidence: 90.0,
            },
        )
        .unwrap();
        assert_eq!(report.summary.matched_count, 2);
        assert_eq!(report.summary.estimated_cost.total, 37.5);
        assert!(report.validation.is_valid);
    }

    #[test]
    fn test_match_from_ocr_file() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("rx.db");
        let catalog = write_catalog(dir.path());
        run_import(&db_path, &ImportArgs { catalog }).unwrap();

        let ocr = dir.path().join("ocr.json");
        fs::write(&ocr, r#"{"medicineNames": ["aspirin 100mg"], "confidence": 70}"#).unwrap();

        let report = run_match(
            &db_path,
            MatcherConfig::immediate(),
            &MatchArgs {
                input: Some(ocr),
                names: Vec::new(),
                ocr_confidence: 100.0,
            },
        )
        .unwrap();
        assert_eq!(report.summary.best_match_ids(), vec!["ASP100"]);
        assert_eq!(report.summary.ocr_confidence, 70.0);
    }

    #[test]
    fn test_match_requires_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_match(
            &dir.path().join("empty.db"),
            MatcherConfig::immediate(),
            &MatchArgs {
                input: None,
                names: vec!["Aspirin".into()],
                ocr_confidence: 100.0,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("no active products"));
    }

    #[test]
    fn test_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matcher.json");
        fs::write(&path, r#"{"max_alternatives": 1}"#).unwrap();

        assert_eq!(load_config(Some(path.as_path())).unwrap().max_alternatives, 1);
        assert_eq!(load_config(None).unwrap(), MatcherConfig::default());
        assert!(load_config(Some(dir.path().join("missing.json").as_path())).is_err());
    }
}
