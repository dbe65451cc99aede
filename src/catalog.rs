//! Built-in record types: DIME campaign finance exports, Voteview roll-call data, the
//! congress-legislators roster and the jobs derived from them.
//!
//! Each [`RecordType`] knows its schema, null markers, reader settings and which statistics are
//! recorded for validation. The derived jobs (distinct legislators, legislator crosswalk,
//! organizational contributions, recipient aggregates) are plain [`JobSpec`]s built from those
//! schemas.
//!
//! ```rust
//! use tabular_certify::catalog::RecordType;
//! use tabular_certify::source::SourceLocator;
//!
//! let job = RecordType::VoteviewMembers.job(SourceLocator::local("HSall_members.csv"), "members.parquet");
//! assert_eq!(job.sum_column.as_deref(), Some("nominate_number_of_votes"));
//! assert!(job.reader.strict_columns);
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{PipelineError, PipelineResult};
use crate::execution::JobSpec;
use crate::processing::{GroupSpec, Predicate, Reducer};
use crate::source::{Encoding, ReaderOptions, SourceLocator};
use crate::types::{DataType, Field, Schema, Transform};

use DataType::{Float64, Int16, Int32, Utf8};

/// Base URL of the published dataset mirror.
pub const DATASET_BASE_URL: &str = "https://huggingface.co/datasets/Dustinhax/tyt/resolve/main";

/// Published congress-legislators CSV files.
pub const LEGISLATORS_BASE_URL: &str = "https://unitedstates.github.io/congress-legislators";

/// First and last DIME election cycle.
pub const MIN_CYCLE: u16 = 1980;
pub const MAX_CYCLE: u16 = 2024;

/// First congress kept by the distinct-legislators job (1979-1980).
pub const MIN_CONGRESS: i64 = 96;

const DIME_NULLS: &[&str] = &["", "\\N"];
const VOTEVIEW_NULLS: &[&str] = &["", "N/A"];
const LEGISLATORS_NULLS: &[&str] = &[""];
const LEGISLATORS_KEY: &[&str] = &["bioguide_id"];

/// Roster columns. Everything stays text: ids keep leading zeros, historical birthdays can be
/// partial and `fec_ids` holds a comma-separated list.
const LEGISLATORS_COLUMNS: [&str; 36] = [
    "last_name",
    "first_name",
    "middle_name",
    "suffix",
    "nickname",
    "full_name",
    "birthday",
    "gender",
    "type",
    "state",
    "district",
    "senate_class",
    "party",
    "url",
    "address",
    "phone",
    "contact_form",
    "rss_url",
    "twitter",
    "twitter_id",
    "facebook",
    "youtube",
    "youtube_id",
    "mastodon",
    "bioguide_id",
    "thomas_id",
    "opensecrets_id",
    "lis_id",
    "fec_ids",
    "cspan_id",
    "govtrack_id",
    "votesmart_id",
    "ballotpedia_id",
    "washington_post_id",
    "icpsr_id",
    "wikipedia_id",
];

/// A source record type with a fixed schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    DimeContributions,
    DimeRecipients,
    DimeContributors,
    VoteviewMembers,
    VoteviewRollcalls,
    VoteviewVotes,
    /// Members of the sitting congress.
    LegislatorsCurrent,
    /// Every former member.
    LegislatorsHistorical,
}

impl RecordType {
    pub const ALL: [RecordType; 8] = [
        Self::DimeContributions,
        Self::DimeRecipients,
        Self::DimeContributors,
        Self::VoteviewMembers,
        Self::VoteviewRollcalls,
        Self::VoteviewVotes,
        Self::LegislatorsCurrent,
        Self::LegislatorsHistorical,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::DimeContributions => "dime_contributions",
            Self::DimeRecipients => "dime_recipients",
            Self::DimeContributors => "dime_contributors",
            Self::VoteviewMembers => "voteview_members",
            Self::VoteviewRollcalls => "voteview_rollcalls",
            Self::VoteviewVotes => "voteview_votes",
            Self::LegislatorsCurrent => "legislators_current",
            Self::LegislatorsHistorical => "legislators_historical",
        }
    }

    fn is_dime(self) -> bool {
        matches!(self, Self::DimeContributions | Self::DimeRecipients | Self::DimeContributors)
    }

    fn is_legislators(self) -> bool {
        matches!(self, Self::LegislatorsCurrent | Self::LegislatorsHistorical)
    }

    /// Declared schema, in source column order.
    pub fn schema(self) -> Schema {
        let fields = match self {
            Self::DimeContributions => typed(&[
                ("cycle", Int32),
                ("transaction.id", Utf8),
                ("transaction.type", Utf8),
                ("amount", Float64),
                ("date", Utf8),
                ("bonica.cid", Utf8),
                ("contributor.name", Utf8),
                ("contributor.lname", Utf8),
                ("contributor.fname", Utf8),
                ("contributor.mname", Utf8),
                ("contributor.suffix", Utf8),
                ("contributor.title", Utf8),
                ("contributor.ffname", Utf8),
                ("contributor.type", Utf8),
                ("contributor.gender", Utf8),
                ("contributor.address", Utf8),
                ("contributor.city", Utf8),
                ("contributor.state", Utf8),
                ("contributor.zipcode", Utf8),
                ("contributor.occupation", Utf8),
                ("contributor.employer", Utf8),
                ("occ.standardized", Utf8),
                ("is.corp", Utf8),
                ("recipient.name", Utf8),
                ("bonica.rid", Utf8),
                ("recipient.party", Utf8),
                ("recipient.type", Utf8),
                ("recipient.state", Utf8),
                ("seat", Utf8),
                ("election.type", Utf8),
                ("latitude", Utf8),
                ("longitude", Utf8),
                ("gis.confidence", Float64),
                ("contributor.district", Utf8),
                ("censustract", Utf8),
                ("excluded.from.scaling", Int32),
                ("contributor.cfscore", Float64),
                ("candidate.cfscore", Float64),
                ("efec.memo", Utf8),
                ("efec.memo2", Utf8),
                ("efec.transaction.id.orig", Utf8),
                ("bk.ref.transaction.id", Utf8),
                ("efec.org.orig", Utf8),
                ("efec.comid.orig", Utf8),
                ("efec.form.type", Utf8),
            ]),
            Self::DimeRecipients => {
                let mut fields = typed(&[
                    ("election", Utf8),
                    ("cycle", Float64),
                    ("fecyear", Float64),
                    ("bonica.rid", Utf8),
                    ("bonica.cid", Utf8),
                    ("name", Utf8),
                    ("lname", Utf8),
                    ("ffname", Utf8),
                    ("fname", Utf8),
                    ("mname", Utf8),
                    ("title", Utf8),
                    ("suffix", Utf8),
                    ("party", Utf8),
                    ("state", Utf8),
                    ("seat", Utf8),
                    ("district", Utf8),
                    ("distcyc", Utf8),
                    ("ico.status", Utf8),
                    ("cand.gender", Utf8),
                    ("recipient.cfscore", Float64),
                    ("recipient.cfscore.dyn", Float64),
                    ("contributor.cfscore", Float64),
                    ("dwdime", Float64),
                    ("dwnom1", Float64),
                    ("dwnom2", Float64),
                    ("ps.dwnom1", Float64),
                    ("ps.dwnom2", Float64),
                    ("irt.cfscore", Float64),
                    ("composite.score", Float64),
                    ("num.givers", Float64),
                    ("num.givers.total", Float64),
                ]);
                fields.extend(text(&[
                    "pwinner",
                    "gwinner",
                    "s.elec.stat",
                    "r.elec.stat",
                    "fec.cand.status",
                    "recipient.type",
                    "igcat",
                    "comtype",
                    "ICPSR",
                    "ICPSR2",
                    "Cand.ID",
                    "FEC.ID",
                    "NID",
                    "before.switch.ICPSR",
                    "after.switch.ICPSR",
                    "party.orig",
                    "nimsp.party",
                    "nimsp.candidate.ICO.code",
                    "nimsp.district",
                    "nimsp.office",
                    "nimsp.candidate.status",
                    "included_in_scaling",
                ]));
                fields.extend(typed(&[
                    ("total.receipts", Float64),
                    ("total.disbursements", Float64),
                    ("total.indiv.contribs", Float64),
                    ("total.unitemized", Float64),
                    ("total.pac.contribs", Float64),
                    ("total.party.contribs", Float64),
                    ("total.contribs.from.candidate", Float64),
                    ("ind.exp.support", Float64),
                    ("ind.exp.oppose", Float64),
                    ("prim.vote.pct", Float64),
                    ("gen.vote.pct", Float64),
                    ("district.pres.vs", Float64),
                ]));
                fields
            }
            Self::DimeContributors => {
                let mut fields = text(&[
                    "bonica.cid",
                    "contributor.type",
                    "most.recent.contributor.name",
                    "most.recent.contributor.address",
                    "most.recent.contributor.city",
                    "most.recent.contributor.zipcode",
                    "most.recent.contributor.state",
                    "most.recent.contributor.occupation",
                    "most.recent.contributor.employer",
                    "most.recent.transaction.id",
                    "most.recent.transaction.date",
                    "contributor.gender",
                    "is.corp",
                    "is.projected",
                ]);
                fields.extend(typed(&[
                    ("num.distinct", Float64),
                    ("most.recent.contributor.latitude", Float64),
                    ("most.recent.contributor.longitude", Float64),
                    ("contributor.cfscore", Float64),
                    ("first_cycle_active", Float64),
                    ("last_cycle_active", Float64),
                ]));
                fields.extend(cycles().map(|c| Field::new(format!("amount.{c}"), Float64)));
                fields
            }
            Self::VoteviewMembers => typed(&[
                ("congress", Int16),
                ("chamber", Utf8),
                ("icpsr", Int32),
                ("state_icpsr", Float64),
                ("district_code", Float64),
                ("state_abbrev", Utf8),
                ("party_code", Float64),
                ("occupancy", Float64),
                ("last_means", Float64),
                ("bioname", Utf8),
                ("bioguide_id", Utf8),
                ("born", Float64),
                ("died", Float64),
                ("nominate_dim1", Float64),
                ("nominate_dim2", Float64),
                ("nominate_log_likelihood", Float64),
                ("nominate_geo_mean_probability", Float64),
                ("nominate_number_of_votes", Float64),
                ("nominate_number_of_errors", Float64),
                ("conditional", Float64),
                ("nokken_poole_dim1", Float64),
                ("nokken_poole_dim2", Float64),
            ]),
            Self::VoteviewRollcalls => typed(&[
                ("congress", Int16),
                ("chamber", Utf8),
                ("rollnumber", Int32),
                ("date", Utf8),
                ("session", Float64),
                ("clerk_rollnumber", Float64),
                ("yea_count", Int32),
                ("nay_count", Int32),
                ("nominate_mid_1", Float64),
                ("nominate_mid_2", Float64),
                ("nominate_spread_1", Float64),
                ("nominate_spread_2", Float64),
                ("nominate_log_likelihood", Float64),
                ("bill_number", Utf8),
                ("vote_result", Utf8),
                ("vote_desc", Utf8),
                ("vote_question", Utf8),
                ("dtl_desc", Utf8),
            ]),
            // Rollnumber, icpsr and cast code appear as "10713.0" in the export.
            Self::VoteviewVotes => typed(&[
                ("congress", Int16),
                ("chamber", Utf8),
                ("rollnumber", Float64),
                ("icpsr", Float64),
                ("cast_code", Float64),
                ("prob", Float64),
            ]),
            Self::LegislatorsCurrent | Self::LegislatorsHistorical => text(&LEGISLATORS_COLUMNS),
        };
        let nulls = if self.is_dime() {
            DIME_NULLS
        } else if self.is_legislators() {
            LEGISLATORS_NULLS
        } else {
            VOTEVIEW_NULLS
        };
        Schema::new(self.name(), fields).with_null_markers(nulls)
    }

    /// Column summed for the checksum. The all-text legislator rosters have none.
    pub fn sum_column(self) -> Option<&'static str> {
        match self {
            Self::DimeContributions => Some("amount"),
            Self::DimeRecipients => Some("recipient.cfscore"),
            Self::DimeContributors => Some("contributor.cfscore"),
            Self::VoteviewMembers => Some("nominate_number_of_votes"),
            Self::VoteviewRollcalls => Some("yea_count"),
            Self::VoteviewVotes => Some("cast_code"),
            Self::LegislatorsCurrent | Self::LegislatorsHistorical => None,
        }
    }

    /// Columns identifying one record, when the type has them.
    pub fn primary_key(self) -> Option<&'static [&'static str]> {
        self.is_legislators().then_some(LEGISLATORS_KEY)
    }

    /// Columns whose non-null counts are recorded.
    pub fn tracked_columns(self) -> &'static [&'static str] {
        match self {
            Self::DimeContributions => &["transaction.id", "bonica.cid", "contributor.name", "amount"],
            Self::DimeRecipients => &["bonica.rid", "bonica.cid", "name"],
            Self::DimeContributors => &["bonica.cid", "most.recent.contributor.name"],
            Self::VoteviewMembers => &["icpsr", "congress", "chamber", "bioname"],
            Self::VoteviewRollcalls => &["congress", "chamber", "rollnumber", "date"],
            Self::VoteviewVotes => &["congress", "chamber", "rollnumber", "icpsr", "cast_code"],
            Self::LegislatorsCurrent | Self::LegislatorsHistorical => &["bioguide_id", "icpsr_id", "state", "type"],
        }
    }

    /// Suggested sample size for the field-by-field tier.
    pub fn sample_size(self) -> usize {
        match self {
            Self::VoteviewVotes => 2_000,
            Self::LegislatorsCurrent => 500,
            _ => 1_000,
        }
    }

    /// Reader settings: exact header check, Latin-1 for the DIME exports.
    pub fn reader_options(self) -> ReaderOptions {
        ReaderOptions {
            encoding: if self.is_dime() { Encoding::Latin1 } else { Encoding::Utf8 },
            strict_columns: true,
            ..ReaderOptions::default()
        }
    }

    /// A pass-through conversion job for this record type.
    ///
    /// Types with a primary key are also checked for duplicate keys, and the sample tier finds
    /// their rows by key.
    pub fn job(self, source: SourceLocator, output: impl Into<PathBuf>) -> JobSpec {
        let mut job = JobSpec::pass_through(self.name(), source, output, Arc::new(self.schema()))
            .with_tracked_columns(self.tracked_columns())
            .with_reader(self.reader_options());
        if let Some(column) = self.sum_column() {
            job = job.with_sum_column(column);
        }
        if let Some(key) = self.primary_key() {
            job = job.with_primary_key(key).with_unique_key(key);
        }
        job
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RecordType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| PipelineError::config(format!("unknown record type '{s}'")))
    }
}

fn typed(spec: &[(&str, DataType)]) -> Vec<Field> {
    spec.iter().map(|(name, dt)| Field::new(*name, *dt)).collect()
}

fn text(names: &[&str]) -> Vec<Field> {
    names.iter().map(|name| Field::new(*name, Utf8)).collect()
}

/// Keep only the named fields, in schema order.
fn subset(schema: Schema, names: &[&str]) -> Schema {
    Schema {
        fields: schema
            .fields
            .into_iter()
            .filter(|f| names.contains(&f.name.as_str()))
            .collect(),
        ..schema
    }
}

fn cycles() -> impl Iterator<Item = u16> {
    (MIN_CYCLE..=MAX_CYCLE).step_by(2)
}

/// Mirror URL of one cycle's contributions file. Cycles are even years from 1980 to 2024.
pub fn contributions_url(cycle: u16) -> PipelineResult<SourceLocator> {
    if !cycles().any(|c| c == cycle) {
        return Err(PipelineError::config(format!(
            "cycle {cycle} is not an even year between {MIN_CYCLE} and {MAX_CYCLE}"
        )));
    }
    SourceLocator::parse(&format!("{DATASET_BASE_URL}/dime/contributions/by_year/contribDB_{cycle}.parquet"))
}

/// Mirror URL of the DIME recipients file.
pub fn recipients_url() -> PipelineResult<SourceLocator> {
    SourceLocator::parse(&format!("{DATASET_BASE_URL}/dime/recipients/dime_recipients_all_1979_2024.parquet"))
}

/// Mirror URL of the Voteview members file.
pub fn voteview_members_url() -> PipelineResult<SourceLocator> {
    SourceLocator::parse(&format!("{DATASET_BASE_URL}/voteview/HSall_members.parquet"))
}

/// Published URL of the current or historical legislators roster.
pub fn legislators_url(record: RecordType) -> PipelineResult<SourceLocator> {
    let file = match record {
        RecordType::LegislatorsCurrent => "legislators-current.csv",
        RecordType::LegislatorsHistorical => "legislators-historical.csv",
        other => return Err(PipelineError::config(format!("{other} is not a legislators roster"))),
    };
    SourceLocator::parse(&format!("{LEGISLATORS_BASE_URL}/{file}"))
}

/// One row per legislator serving since [`MIN_CONGRESS`], from Voteview members.
///
/// Name, state, party and NOMINATE scores come from the legislator's latest congress.
pub fn distinct_legislators_job(source: SourceLocator, output: impl Into<PathBuf>) -> JobSpec {
    let members = RecordType::VoteviewMembers;
    let schema = subset(
        members.schema(),
        &["congress", "bioname", "bioguide_id", "state_abbrev", "party_code", "nominate_dim1", "nominate_dim2"],
    );
    let group = GroupSpec::new("distinct_legislators", &["bioguide_id"])
        .column("bioname", Reducer::last_by("bioname", "congress"))
        .column("state_abbrev", Reducer::last_by("state_abbrev", "congress"))
        .column("party_code", Reducer::last_by("party_code", "congress"))
        .column("congresses_served", Reducer::list_ordered("congress", "congress"))
        .column("first_congress", Reducer::Min("congress".into()))
        .column("last_congress", Reducer::Max("congress".into()))
        .column("nominate_dim1", Reducer::last_by("nominate_dim1", "congress"))
        .column("nominate_dim2", Reducer::last_by("nominate_dim2", "congress"));
    JobSpec::aggregate(group.name.clone(), source, output, Arc::new(schema), group)
        .with_filter(Predicate::at_least("congress", MIN_CONGRESS as f64).and(Predicate::not_null("bioguide_id")))
        .with_tracked_columns(&["bioguide_id", "first_congress", "last_congress"])
}

/// Distinct (ICPSR, DIME recipient id) pairs from DIME recipients.
///
/// DIME stores ICPSR with the cycle year appended (`"100751980"`); the year is stripped so the
/// ids join against Voteview.
pub fn legislator_crosswalk_job(source: SourceLocator, output: impl Into<PathBuf>) -> JobSpec {
    let schema = Schema::new(
        "dime_recipients",
        vec![
            Field::new("icpsr", Utf8)
                .from_source("ICPSR")
                .with_transform(Transform::StripSuffix { len: 4 }),
            Field::new("bonica_rid", Utf8).from_source("bonica.rid"),
            Field::new("recipient_name", Utf8).from_source("name"),
            Field::new("party", Utf8),
            Field::new("state", Utf8),
            Field::new("seat", Utf8),
            Field::new("fec_id", Utf8).from_source("FEC.ID"),
        ],
    )
    .with_null_markers(DIME_NULLS);
    let mut group = GroupSpec::new("legislator_recipient_crosswalk", &["icpsr", "bonica_rid"]);
    for column in ["recipient_name", "party", "state", "seat", "fec_id"] {
        group = group.column(column, Reducer::Max(column.into()));
    }
    JobSpec::aggregate(group.name.clone(), source, output, Arc::new(schema), group)
        .with_filter(
            Predicate::not_null("ICPSR")
                .and(Predicate::longer_than("ICPSR", 4))
                .and(Predicate::not_null("bonica.rid")),
        )
        .with_reader(ReaderOptions {
            encoding: Encoding::Latin1,
            ..ReaderOptions::default()
        })
}

/// Contributions from non-individual contributors (PACs, corporations, committees, unions).
pub fn organizational_contributions_job(source: SourceLocator, output: impl Into<PathBuf>) -> JobSpec {
    let contributions = RecordType::DimeContributions;
    let mut job = contributions
        .job(source, output)
        .with_filter(Predicate::not_equals("contributor.type", "I"))
        .with_reader(ReaderOptions {
            strict_columns: false,
            ..contributions.reader_options()
        });
    job.name = "organizational_contributions".to_owned();
    job
}

/// Per-recipient totals with individual and organizational breakdowns.
pub fn recipient_aggregates_job(source: SourceLocator, output: impl Into<PathBuf>) -> JobSpec {
    let contributions = RecordType::DimeContributions;
    let schema = subset(
        contributions.schema(),
        &[
            "amount",
            "contributor.type",
            "recipient.name",
            "bonica.rid",
            "recipient.party",
            "recipient.type",
            "recipient.state",
            "candidate.cfscore",
        ],
    );
    let individual = Predicate::equals("contributor.type", "I");
    let organizational = Predicate::not_equals("contributor.type", "I");
    let group = GroupSpec::new(
        "recipient_aggregates",
        &[
            "bonica.rid",
            "recipient.name",
            "recipient.party",
            "recipient.type",
            "recipient.state",
            "candidate.cfscore",
        ],
    )
    .column("total_amount", Reducer::Sum("amount".into()))
    .column("avg_amount", Reducer::Avg("amount".into()))
    .column("contribution_count", Reducer::Count)
    .column("individual_total", Reducer::sum_if("amount", individual.clone()))
    .column("individual_count", Reducer::CountIf(individual))
    .column("organizational_total", Reducer::sum_if("amount", organizational.clone()))
    .column("organizational_count", Reducer::CountIf(organizational));
    JobSpec::aggregate(group.name.clone(), source, output, Arc::new(schema), group)
        .with_filter(Predicate::not_null("bonica.rid"))
        .with_tracked_columns(&["bonica.rid", "contribution_count"])
        .with_sum_column("total_amount")
        .with_reader(ReaderOptions {
            strict_columns: false,
            ..contributions.reader_options()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::JobKind;

    #[test]
    fn every_record_type_checks_out() {
        for t in RecordType::ALL {
            let job = t.job(SourceLocator::local("in.csv"), "out.parquet");
            job.check().unwrap();
            assert_eq!(t.name().parse::<RecordType>().unwrap(), t);
        }
        assert_eq!(RecordType::DimeContributions.schema().fields.len(), 45);
        assert_eq!(RecordType::DimeRecipients.schema().fields.len(), 65);
        assert_eq!(RecordType::DimeContributors.schema().fields.len(), 43);
        assert_eq!(RecordType::VoteviewMembers.schema().fields.len(), 22);
        assert_eq!(RecordType::LegislatorsHistorical.schema().fields.len(), 36);
        assert!("dime".parse::<RecordType>().is_err());
    }

    #[test]
    fn legislator_rosters_are_keyed_text() {
        for t in [RecordType::LegislatorsCurrent, RecordType::LegislatorsHistorical] {
            let schema = t.schema();
            assert!(schema.fields.iter().all(|f| f.data_type == DataType::Utf8));
            assert!(schema.is_null_text(""));
            assert!(!schema.is_null_text("\\N"));
            assert!(!schema.is_null_text("N/A"));

            let job = t.job(SourceLocator::local("legislators.csv"), "out.parquet");
            job.check().unwrap();
            assert_eq!(job.sum_column, None);
            assert_eq!(job.primary_key, vec!["bioguide_id".to_owned()]);
            assert_eq!(job.unique_key, vec!["bioguide_id".to_owned()]);
            assert!(job.reader.strict_columns);
        }
        assert_eq!(RecordType::LegislatorsCurrent.sample_size(), 500);
        assert!(legislators_url(RecordType::LegislatorsCurrent)
            .unwrap()
            .to_string()
            .ends_with("/legislators-current.csv"));
        assert!(legislators_url(RecordType::VoteviewVotes).is_err());
        assert_eq!(RecordType::VoteviewVotes.primary_key(), None);
    }

    #[test]
    fn null_markers_follow_the_export() {
        let dime = RecordType::DimeContributions.schema();
        assert!(dime.is_null_text("\\N"));
        assert!(!dime.is_null_text("N/A"));
        let voteview = RecordType::VoteviewVotes.schema();
        assert!(voteview.is_null_text("N/A"));
        assert!(!voteview.is_null_text("\\N"));
        assert_eq!(RecordType::DimeContributors.reader_options().encoding, Encoding::Latin1);
    }

    #[test]
    fn derived_jobs_have_valid_output_schemas() {
        let src = || SourceLocator::local("in.parquet");
        let legislators = distinct_legislators_job(src(), "l.parquet");
        let out = legislators.check().unwrap();
        assert_eq!(out.field("congresses_served").unwrap().data_type, DataType::ListInt16);
        assert_eq!(out.field("first_congress").unwrap().data_type, DataType::Int16);
        assert_eq!(legislators.required_source_columns().len(), 7);

        let crosswalk = legislator_crosswalk_job(src(), "x.parquet");
        let out = crosswalk.check().unwrap();
        assert_eq!(
            out.field_names().collect::<Vec<_>>(),
            vec!["icpsr", "bonica_rid", "recipient_name", "party", "state", "seat", "fec_id"]
        );

        let aggregates = recipient_aggregates_job(src(), "a.parquet");
        let out = aggregates.check().unwrap();
        assert_eq!(out.field("individual_count").unwrap().data_type, DataType::Int64);
        assert!(matches!(aggregates.kind, JobKind::Aggregate(ref g) if g.key.len() == 6));

        let org = organizational_contributions_job(src(), "o.parquet");
        assert_eq!(org.name, "organizational_contributions");
        assert!(org.filter.is_some());
    }

    #[test]
    fn contribution_urls_only_for_even_cycles() {
        let url = contributions_url(2020).unwrap();
        assert!(url.to_string().ends_with("contribDB_2020.parquet"));
        assert!(contributions_url(2021).is_err());
        assert!(contributions_url(1978).is_err());
        assert!(contributions_url(2026).is_err());
    }
}
