use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The string form doubles as the serde representation.
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(
    /// How a document's stored text was produced.
    ProcessingMethod {
        Native => "native",
        NativeOnlyDegraded => "native_only_degraded",
        HybridWithRecognition => "hybrid_with_recognition",
    }
);

str_enum!(
    /// Task lifecycle. Terminal states never transition again.
    TaskStatus {
        Pending => "PENDING",
        Processing => "PROCESSING",
        Completed => "COMPLETED",
        Failed => "FAILED",
    }
);

str_enum!(
    /// Detected document format, resolved once at ingestion.
    DocumentFormat {
        Pdf => "pdf",
        Csv => "csv",
        Tsv => "tsv",
        PlainText => "plain_text",
        Json => "json",
        Xml => "xml",
        Image => "image",
        Html => "html",
        Docx => "docx",
    }
);

str_enum!(
    /// Keyword-scored table classification.
    TableType {
        Financial => "financial",
        Contact => "contact",
        Statistics => "statistics",
        Schedule => "schedule",
        Inventory => "inventory",
        Performance => "performance",
        Data => "data",
    }
);

str_enum!(
    /// Which routine produced a table.
    TableSource {
        NativeLayout => "native_layout",
        DelimitedParser => "delimited_parser",
        Markup => "markup",
        RecognizedText => "recognized_text",
    }
);

str_enum!(
    ColumnType {
        Currency => "currency",
        Percentage => "percentage",
        Date => "date",
        Numeric => "numeric",
        Text => "text",
    }
);

str_enum!(
    /// Classified failure kinds surfaced to callers. Only kind and message
    /// ever cross the service boundary.
    ErrorKind {
        DuplicateContent => "duplicate_content",
        StorageCorruption => "storage_corruption",
        UnsupportedFormat => "unsupported_format",
        RecognitionEngineUnavailable => "recognition_engine_unavailable",
        TaskTimeout => "task_timeout",
        BackendUnreachable => "backend_unreachable",
        MalformedTabularInput => "malformed_tabular_input",
        NotFound => "not_found",
        Internal => "internal",
    }
);

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Allowed moves: forward only, plus an idempotent re-pickup of
    /// `PROCESSING`.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Processing) => true,
            (Self::Pending, Self::Failed) => true,
            (Self::Processing, Self::Processing) => true,
            (Self::Processing, Self::Completed) => true,
            (Self::Processing, Self::Failed) => true,
            _ => false,
        }
    }
}

impl DocumentFormat {
    pub fn is_tabular(&self) -> bool {
        matches!(self, Self::Csv | Self::Tsv)
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Csv => "text/csv",
            Self::Tsv => "text/tab-separated-values",
            Self::PlainText => "text/plain",
            Self::Json => "application/json",
            Self::Xml => "application/xml",
            Self::Image => "image/*",
            Self::Html => "text/html",
            Self::Docx => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        }
    }
}
