use crate::model::ScanReport;
use anyhow::Result;

pub fn print_json(report: &ScanReport) -> Result<()> {
    println!("{}", generate_json_string(report)?);
    Ok(())
}

pub fn generate_json_string(report: &ScanReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Dependency, DependencyReport};

    #[test]
    fn test_json_shape() {
        let dep = Dependency::new_virtual(std::path::Path::new("/app/package-lock.json"), "lodash:4.17.20");
        let report = ScanReport::new(vec![DependencyReport::from_dependency(&dep)], Vec::new());

        let value: serde_json::Value = serde_json::from_str(&generate_json_string(&report).unwrap()).unwrap();
        assert!(value["generated_at"].is_string());
        assert_eq!(value["dependencies"][0]["display_name"], "lodash:4.17.20");
        assert_eq!(value["dependencies"][0]["virtual"], true);
        assert!(value["skipped"].as_array().unwrap().is_empty());
    }
}
