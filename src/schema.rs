//! Fixed column layout of a voter registration extract.
//!
//! Extracts are headerless, so a column is identified purely by its position.
//! Everything that needs a column list (row transformation, DDL, bulk
//! statements, row decoding, category aggregation) derives it from [`Field`].

use std::fmt;

/// How a column's raw text is turned into a typed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Natural key of the voter; must be present.
    Identifier,
    /// Whole number; blank or non-numeric text is treated as absent.
    Integer,
    /// `mm/dd/yyyy`; blank is absent, anything malformed is fatal.
    Date,
    /// Trimmed text, empty when the column is missing.
    Text,
}

/// One column of the extract, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    VoterId,
    LastName,
    FirstName,
    MiddleName,
    NameSuffix,
    HouseNumber,
    HouseSuffix,
    StreetName,
    Apartment,
    City,
    Zip,
    Zip4,
    MailingAddress,
    Town,
    Ward,
    ElectionDistrict,
    CongressionalDistrict,
    SenateDistrict,
    AssemblyDistrict,
    LegislativeDistrict,
    Party,
    Gender,
    DateOfBirth,
    RegistrationDate,
    LastVotedDate,
    Status,
    StatusReason,
    CountyVoterId,
    RegistrationSource,
}

impl Field {
    /// Every column in file order.
    pub const ALL: [Field; 29] = [
        Field::VoterId,
        Field::LastName,
        Field::FirstName,
        Field::MiddleName,
        Field::NameSuffix,
        Field::HouseNumber,
        Field::HouseSuffix,
        Field::StreetName,
        Field::Apartment,
        Field::City,
        Field::Zip,
        Field::Zip4,
        Field::MailingAddress,
        Field::Town,
        Field::Ward,
        Field::ElectionDistrict,
        Field::CongressionalDistrict,
        Field::SenateDistrict,
        Field::AssemblyDistrict,
        Field::LegislativeDistrict,
        Field::Party,
        Field::Gender,
        Field::DateOfBirth,
        Field::RegistrationDate,
        Field::LastVotedDate,
        Field::Status,
        Field::StatusReason,
        Field::CountyVoterId,
        Field::RegistrationSource,
    ];

    /// Columns whose distinct values are collected for filtering.
    pub const CATEGORIES: [Field; 12] = [
        Field::City,
        Field::Zip,
        Field::Town,
        Field::Ward,
        Field::ElectionDistrict,
        Field::CongressionalDistrict,
        Field::SenateDistrict,
        Field::AssemblyDistrict,
        Field::LegislativeDistrict,
        Field::Party,
        Field::Gender,
        Field::Status,
    ];

    /// Zero-based column position in the extract.
    pub fn position(self) -> usize {
        self as usize
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Field::VoterId => FieldKind::Identifier,
            Field::HouseNumber
            | Field::Ward
            | Field::ElectionDistrict
            | Field::CongressionalDistrict
            | Field::SenateDistrict
            | Field::AssemblyDistrict
            | Field::LegislativeDistrict => FieldKind::Integer,
            Field::DateOfBirth | Field::RegistrationDate | Field::LastVotedDate => FieldKind::Date,
            _ => FieldKind::Text,
        }
    }

    /// Database column name; also used as the category key.
    pub fn column(self) -> &'static str {
        match self {
            Field::VoterId => "voter_id",
            Field::LastName => "last_name",
            Field::FirstName => "first_name",
            Field::MiddleName => "middle_name",
            Field::NameSuffix => "name_suffix",
            Field::HouseNumber => "house_number",
            Field::HouseSuffix => "house_suffix",
            Field::StreetName => "street_name",
            Field::Apartment => "apartment",
            Field::City => "city",
            Field::Zip => "zip",
            Field::Zip4 => "zip4",
            Field::MailingAddress => "mailing_address",
            Field::Town => "town",
            Field::Ward => "ward",
            Field::ElectionDistrict => "election_district",
            Field::CongressionalDistrict => "congressional_district",
            Field::SenateDistrict => "senate_district",
            Field::AssemblyDistrict => "assembly_district",
            Field::LegislativeDistrict => "legislative_district",
            Field::Party => "party",
            Field::Gender => "gender",
            Field::DateOfBirth => "date_of_birth",
            Field::RegistrationDate => "registration_date",
            Field::LastVotedDate => "last_voted_date",
            Field::Status => "status",
            Field::StatusReason => "status_reason",
            Field::CountyVoterId => "county_voter_id",
            Field::RegistrationSource => "registration_source",
        }
    }

    /// Every column except the identifier, in file order.
    pub fn data_fields() -> impl Iterator<Item = Field> {
        Field::ALL
            .into_iter()
            .filter(|f| f.kind() != FieldKind::Identifier)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Number of columns in an extract row.
pub const FIELD_COUNT: usize = Field::ALL.len();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_follow_declaration_order() {
        for (idx, field) in Field::ALL.iter().enumerate() {
            assert_eq!(field.position(), idx, "{field}");
        }
    }

    #[test]
    fn only_the_first_column_is_the_identifier() {
        let ids: Vec<_> = Field::ALL
            .iter()
            .filter(|f| f.kind() == FieldKind::Identifier)
            .collect();
        assert_eq!(ids, vec![&Field::VoterId]);
        assert_eq!(Field::data_fields().count(), FIELD_COUNT - 1);
    }

    #[test]
    fn category_columns_are_never_dates() {
        assert!(Field::CATEGORIES
            .iter()
            .all(|f| !matches!(f.kind(), FieldKind::Date | FieldKind::Identifier)));
    }
}
