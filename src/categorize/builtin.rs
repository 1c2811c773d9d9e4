/// Synonyms for the stock healthcare categories. Configured keywords extend
/// these when `output.builtin_keywords` is on.
const BUILTIN_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "AI Diagnostics",
        &["diagnostic", "diagnosis", "triage", "decision support", "cds", "cad"],
    ),
    (
        "Telemedicine",
        &["telemedicine", "telehealth", "virtual care", "telemed", "remote consult"],
    ),
    (
        "EHR & Clinical Systems",
        &[
            "ehr",
            "emr",
            "electronic health record",
            "electronic medical record",
            "clinical system",
            "clinical workflow",
        ],
    ),
    (
        "Imaging & Radiology",
        &[
            "radiology",
            "medical imaging",
            "imaging",
            "dicom",
            "pacs",
            "ct",
            "mri",
            "xray",
            "x-ray",
            "ultrasound",
        ],
    ),
    (
        "Wearables & Remote Monitoring",
        &["wearable", "wearables", "remote monitoring", "rpm", "smartwatch", "fitness tracker"],
    ),
    (
        "Public Health & Epidemiology",
        &["public health", "epidemiology", "surveillance", "outbreak"],
    ),
    (
        "Genomics & Precision Medicine",
        &["genomic", "genomics", "precision medicine", "vcf", "variant", "bioinformatics"],
    ),
    (
        "Mental Health",
        &["mental health", "psychiatry", "psychology", "therapy", "depression", "anxiety"],
    ),
    (
        "Scheduling & Patient Portals",
        &["scheduling", "appointment", "booking", "patient portal", "portal"],
    ),
    (
        "NLP & Clinical Text",
        &[
            "nlp",
            "natural language",
            "clinical text",
            "de-identification",
            "deidentification",
            "ner",
            "clinical notes",
        ],
    ),
    (
        "FHIR & Interoperability",
        &["fhir", "hl7", "interoperability", "ccd", "ccda", "smart on fhir", "smart-on-fhir"],
    ),
    (
        "Data Platforms & ETL",
        &[
            "etl",
            "extract transform load",
            "data platform",
            "data pipeline",
            "warehouse",
            "lakehouse",
        ],
    ),
];

/// Built-in synonyms for a category name (exact match), empty if none.
pub fn builtin_keywords(category: &str) -> &'static [&'static str] {
    BUILTIN_KEYWORDS
        .iter()
        .find(|(name, _)| *name == category)
        .map(|(_, keywords)| *keywords)
        .unwrap_or(&[])
}

pub fn builtin_categories() -> impl Iterator<Item = &'static str> {
    BUILTIN_KEYWORDS.iter().map(|(name, _)| *name)
}
