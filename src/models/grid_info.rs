use crate::core::config::GridConfig;
use crate::rpc::encoder::escape_into;
use serde::Serialize;

pub const PLATFORM: &str = "GridLogin";

/// Public description of the grid, served as the `grid-info` login section
/// and by `GET /get_grid_info`
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GridInfo {
    pub platform: String,
    pub login: String,
    pub economy: String,
    pub register: String,
    pub gridname: String,
    pub gridnick: String,
}

impl GridInfo {
    pub fn from_config(grid: &GridConfig) -> Self {
        let base = grid.base_url.trim_end_matches('/');

        Self {
            platform: PLATFORM.to_string(),
            login: format!("{}/login", base),
            economy: format!("{}/simulation/economy", base),
            register: format!("{}/simulation/register", base),
            gridname: grid.grid_name.clone(),
            gridnick: grid.grid_nick.clone(),
        }
    }

    fn entries(&self) -> [(&'static str, &str); 6] {
        [
            ("platform", &self.platform),
            ("login", &self.login),
            ("economy", &self.economy),
            ("register", &self.register),
            ("gridname", &self.gridname),
            ("gridnick", &self.gridnick),
        ]
    }

    /// `<gridinfo>` document
    pub fn to_xml(&self) -> String {
        let mut buf = String::with_capacity(512);
        buf.push_str("<?xml version=\"1.0\"?>\n<gridinfo>\n");
        for (name, value) in self.entries() {
            buf.push_str("  <");
            buf.push_str(name);
            buf.push('>');
            escape_into(value, &mut buf);
            buf.push_str("</");
            buf.push_str(name);
            buf.push_str(">\n");
        }
        buf.push_str("</gridinfo>\n");
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_derive_from_base() {
        let mut grid = GridConfig::default();
        grid.base_url = "https://grid.example.org/".to_string();

        let info = GridInfo::from_config(&grid);

        assert_eq!(info.login, "https://grid.example.org/login");
        assert_eq!(info.economy, "https://grid.example.org/simulation/economy");
        assert_eq!(info.gridname, "Dark Space");
        assert_eq!(info.gridnick, "space");
    }

    #[test]
    fn test_xml_document_escapes_values() {
        let mut grid = GridConfig::default();
        grid.grid_name = "Dark & Space".to_string();

        let xml = GridInfo::from_config(&grid).to_xml();

        assert!(xml.contains("<gridinfo>"));
        assert!(xml.contains("<gridname>Dark &amp; Space</gridname>"));
        assert!(xml.contains("<login>http://localhost:7768/login</login>"));
        assert!(xml.trim_end().ends_with("</gridinfo>"));
    }
}
