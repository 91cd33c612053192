use serde::{Deserialize, Serialize};

/// Header data printed on certificates and letters.
/// Image fields hold data URIs or file paths and are treated as opaque.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TeacherProfile {
    pub name: String,
    pub school: String,
    pub subject: String,
    pub governorate: String,
    pub academic_year: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ministry_logo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CertificateSettings {
    pub title: String,
    pub body_template: String,
    pub signature_label: String,
    pub show_stamp: bool,
}

impl Default for CertificateSettings {
    fn default() -> Self {
        Self {
            title: "Certificate of Appreciation".into(),
            body_template: "Awarded to {student} of class {class} for outstanding effort.".into(),
            signature_label: "Teacher".into(),
            show_stamp: true,
        }
    }
}
