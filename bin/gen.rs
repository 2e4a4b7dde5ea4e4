use clap::{Arg, Command};
use std::io::{self, Write};

const CITIES: [(&str, &str, &str); 6] = [
    ("ROCHESTER", "14604", "ROCHESTER"),
    ("BRIGHTON", "14610", "BRIGHTON"),
    ("PITTSFORD", "14534", "PITTSFORD"),
    ("GREECE", "14626", "GREECE"),
    ("IRONDEQUOIT", "14617", "IRONDEQUOIT"),
    ("HENRIETTA", "14467", "HENRIETTA"),
];
const PARTIES: [&str; 6] = ["DEM", "REP", "CON", "WOR", "BLK", "IND"];
const GENDERS: [&str; 3] = ["M", "F", "U"];
const STATUSES: [&str; 3] = ["A", "I", "P"];
const STREETS: [&str; 5] = ["MAIN ST", "PARK AVE", "LAKE AVE", "EAST AVE", "MONROE AVE"];

fn main() -> anyhow::Result<()> {
    let matches = Command::new("gen-extract")
        .about("Write a synthetic headerless voter extract to stdout")
        .arg(
            Arg::new("rows")
                .long("rows")
                .value_parser(clap::value_parser!(u64))
                .required(true),
        )
        .arg(
            Arg::new("start")
                .long("start")
                .help("First voter number; shift it to produce overlapping batches")
                .value_parser(clap::value_parser!(u64))
                .default_value("0"),
        )
        .arg(Arg::new("delim").long("delim").default_value(","))
        .arg(
            Arg::new("blank-every")
                .long("blank-every")
                .help("Leave optional columns blank on every Nth row (0 = never)")
                .value_parser(clap::value_parser!(u64))
                .default_value("7"),
        )
        .get_matches();

    let rows = matches.get_one::<u64>("rows").copied().unwrap_or_default();
    let start = matches.get_one::<u64>("start").copied().unwrap_or_default();
    let blank_every = matches.get_one::<u64>("blank-every").copied().unwrap_or_default();
    let delim = matches
        .get_one::<String>("delim")
        .map(String::as_str)
        .unwrap_or(",");

    let mut out = io::BufWriter::new(io::stdout().lock());

    for i in start..start + rows {
        let blank = blank_every > 0 && i % blank_every == 0;
        let (city, zip, town) = CITIES[(i % CITIES.len() as u64) as usize];
        let house = if blank { String::new() } else { (i % 900 + 1).to_string() };
        let last_voted = if blank {
            String::new()
        } else {
            format!("11/{:02}/{}", i % 7 + 2, 2016 + (i % 3) * 2)
        };

        let columns: [String; 29] = [
            format!("NY{i:018}"),
            format!("LAST{}", i % 5_000),
            format!("FIRST{}", i % 700),
            if i % 3 == 0 { "Q".into() } else { String::new() },
            if i % 41 == 0 { "JR".into() } else { String::new() },
            house,
            if i % 53 == 0 { "1/2".into() } else { String::new() },
            STREETS[(i % STREETS.len() as u64) as usize].into(),
            if i % 4 == 0 { format!("APT {}", i % 30 + 1) } else { String::new() },
            city.into(),
            zip.into(),
            format!("{:04}", i % 10_000),
            String::new(),
            town.into(),
            (i % 25 + 1).to_string(),
            (i % 120 + 1).to_string(),
            "25".into(),
            (54 + i % 3).to_string(),
            (133 + i % 6).to_string(),
            (i % 29 + 1).to_string(),
            PARTIES[(i % PARTIES.len() as u64) as usize].into(),
            GENDERS[(i % GENDERS.len() as u64) as usize].into(),
            format!("{:02}/{:02}/{}", i % 12 + 1, i % 28 + 1, 1940 + i % 62),
            format!("{:02}/{:02}/{}", (i + 5) % 12 + 1, (i + 11) % 28 + 1, 2002 + i % 22),
            last_voted,
            STATUSES[(i % STATUSES.len() as u64) as usize].into(),
            String::new(),
            format!("{:09}", i),
            "DMV".into(),
        ];
        writeln!(&mut out, "{}", columns.join(delim))?;

        if i % 10_000 == 0 {
            out.flush()?;
        } // keep buffers moving on huge runs
    }

    out.flush()?;
    Ok(())
}
