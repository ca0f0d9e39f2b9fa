use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Host ORM field class
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
pub enum FieldKind {
    AutoField,
    BigAutoField,
    BigIntegerField,
    BinaryField,
    BooleanField,
    NullBooleanField,
    CharField,
    TextField,
    EmailField,
    SlugField,
    #[strum(serialize = "URLField")]
    #[serde(rename = "URLField")]
    UrlField,
    #[strum(serialize = "IPAddressField")]
    #[serde(rename = "IPAddressField")]
    IpAddressField,
    #[strum(serialize = "GenericIPAddressField")]
    #[serde(rename = "GenericIPAddressField")]
    GenericIpAddressField,
    FileField,
    FilePathField,
    CommaSeparatedIntegerField,
    DateField,
    DateTimeField,
    TimeField,
    FloatField,
    DecimalField,
    IntegerField,
    PositiveIntegerField,
    PositiveSmallIntegerField,
    SmallIntegerField,
    ForeignKey,
    OneToOneField,
    ManyToManyField,
    ReverseRelation,
}

/// How the serializer treats a field kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum FieldCategory {
    Scalar,
    Date,
    RelationSingle,
    RelationMany,
    ReverseRelation,
}

impl FieldKind {
    pub fn category(&self) -> FieldCategory {
        match self {
            FieldKind::DateField | FieldKind::DateTimeField | FieldKind::TimeField => {
                FieldCategory::Date
            }
            FieldKind::ForeignKey | FieldKind::OneToOneField => FieldCategory::RelationSingle,
            FieldKind::ManyToManyField => FieldCategory::RelationMany,
            FieldKind::ReverseRelation => FieldCategory::ReverseRelation,
            _ => FieldCategory::Scalar,
        }
    }

    pub fn is_relation(&self) -> bool {
        !matches!(self.category(), FieldCategory::Scalar | FieldCategory::Date)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            FieldKind::AutoField
                | FieldKind::BigAutoField
                | FieldKind::BigIntegerField
                | FieldKind::IntegerField
                | FieldKind::PositiveIntegerField
                | FieldKind::PositiveSmallIntegerField
                | FieldKind::SmallIntegerField
        )
    }
}

/// A declared model field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub null: bool,
    /// Target model name for relation kinds
    #[serde(default)]
    pub related_model: Option<String>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            null: false,
            related_model: None,
        }
    }

    pub fn foreign_key(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::relation(name, FieldKind::ForeignKey, target)
    }

    pub fn one_to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::relation(name, FieldKind::OneToOneField, target)
    }

    pub fn many_to_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::relation(name, FieldKind::ManyToManyField, target)
    }

    /// Reverse side of a relation declared on `target`
    pub fn reverse(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::relation(name, FieldKind::ReverseRelation, target)
    }

    fn relation(name: impl Into<String>, kind: FieldKind, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            null: true,
            related_model: Some(target.into()),
        }
    }

    pub fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    pub fn category(&self) -> FieldCategory {
        self.kind.category()
    }
}
