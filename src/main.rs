use std::fs;
use std::io::{self, prelude::*};
use std::path;
use std::process;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

use row_sort::{KeySpec, Row, RowSink, RowSorterBuilder, RowSource, Value};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let keys: KeySpec = arg_parser.value_of_t_or_exit("keys");
    let capacity: usize = arg_parser.value_of_t_or_exit("capacity");
    let delimiter: char = arg_parser.value_of_t_or_exit("delimiter");
    let unique = arg_parser.is_present("unique");
    let compress = arg_parser.is_present("compress");
    let tmp_dir: Option<&str> = arg_parser.value_of("tmp_dir");
    let prefix = arg_parser.value_of("prefix").expect("value has default");
    let buf_size = arg_parser.value_of("buf_size");

    let input = arg_parser.value_of("input").expect("value is required");
    let mut source = match fs::File::open(input) {
        Ok(file) => LineSource::new(io::BufReader::new(file), delimiter),
        Err(err) => {
            log::error!("input file opening error: {}", err);
            process::exit(1);
        }
    };

    let output = arg_parser.value_of("output").expect("value is required");
    let mut sink = match fs::File::create(output) {
        Ok(file) => LineSink::new(io::BufWriter::new(file), delimiter),
        Err(err) => {
            log::error!("output file creation error: {}", err);
            process::exit(1);
        }
    };

    let mut sorter_builder = RowSorterBuilder::new()
        .with_keys(keys)
        .with_capacity(capacity)
        .with_unique(unique)
        .with_compression(compress)
        .with_file_prefix(prefix);

    if let Some(tmp_dir) = tmp_dir {
        sorter_builder = sorter_builder.with_tmp_dir(path::Path::new(tmp_dir));
    }

    if let Some(buf_size) = buf_size {
        sorter_builder = sorter_builder
            .with_rw_buf_size(buf_size.parse::<ByteSize>().expect("value is pre-validated").as_u64() as usize);
    }

    let sorter = match sorter_builder.build() {
        Ok(sorter) => sorter,
        Err(err) => {
            log::error!("sorter initialization error: {}", err);
            process::exit(1);
        }
    };

    if let Err(err) = sorter.run(&mut source, &mut sink) {
        log::error!("data sorting error: {}", err);
        process::exit(1);
    }
}

/// Reads delimited text lines as rows.
struct LineSource<R> {
    lines: io::Lines<R>,
    delimiter: char,
}

impl<R: BufRead> LineSource<R> {
    fn new(reader: R, delimiter: char) -> Self {
        LineSource {
            lines: reader.lines(),
            delimiter,
        }
    }
}

impl<R: BufRead> RowSource for LineSource<R> {
    type Error = io::Error;

    fn pull(&mut self) -> Result<Option<Row>, Self::Error> {
        let line = match self.lines.next() {
            Some(line) => line?,
            None => return Ok(None),
        };

        return Ok(Some(line.split(self.delimiter).map(parse_field).collect()));
    }
}

fn parse_field(field: &str) -> Value {
    if field.is_empty() {
        Value::Null
    } else if let Ok(value) = field.parse::<i64>() {
        Value::Integer(value)
    } else if let Ok(value) = field.parse::<f64>() {
        Value::Number(value)
    } else {
        Value::String(field.to_owned())
    }
}

/// Writes rows as delimited text lines.
struct LineSink<W: Write> {
    writer: W,
    delimiter: char,
}

impl<W: Write> LineSink<W> {
    fn new(writer: W, delimiter: char) -> Self {
        LineSink { writer, delimiter }
    }
}

impl<W: Write> RowSink for LineSink<W> {
    type Error = io::Error;

    fn push(&mut self, row: Row) -> Result<(), Self::Error> {
        for (idx, value) in row.values().iter().enumerate() {
            if idx > 0 {
                write!(self.writer, "{}", self.delimiter)?;
            }
            write!(self.writer, "{}", value)?;
        }
        self.writer.write_all(b"\n")
    }

    fn finish(&mut self) -> Result<(), Self::Error> {
        self.writer.flush()
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("row-sort")
        .about("external row sorter")
        .arg(
            clap::Arg::new("input")
                .short('i')
                .long("input")
                .help("file to be sorted")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .help("result file")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("keys")
                .short('k')
                .long("keys")
                .help("key fields, e.g. 0,2:desc,1:ci")
                .required(true)
                .takes_value(true)
                .validator(|v| match v.parse::<KeySpec>() {
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Key fields format incorrect: {}", err)),
                }),
        )
        .arg(
            clap::Arg::new("delimiter")
                .short('s')
                .long("delimiter")
                .help("field delimiter")
                .takes_value(true)
                .default_value(","),
        )
        .arg(
            clap::Arg::new("capacity")
                .short('c')
                .long("capacity")
                .help("number of rows kept in memory")
                .takes_value(true)
                .default_value("5000"),
        )
        .arg(
            clap::Arg::new("unique")
                .short('u')
                .long("unique")
                .help("pass only rows with unique keys"),
        )
        .arg(
            clap::Arg::new("compress")
                .short('z')
                .long("compress")
                .help("compress temporary files"),
        )
        .arg(
            clap::Arg::new("tmp_dir")
                .short('d')
                .long("tmp-dir")
                .help("directory to be used to store temporary data")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("prefix")
                .short('p')
                .long("prefix")
                .help("temporary file name prefix")
                .takes_value(true)
                .default_value("out"),
        )
        .arg(
            clap::Arg::new("buf_size")
                .short('b')
                .long("buf-size")
                .help("temporary file read/write buffer size")
                .takes_value(true)
                .validator(|v| match v.parse::<ByteSize>() {
                    Ok(size) if size.as_u64() > 0 => Ok(()),
                    Ok(_) => Err("Buffer size must be positive".to_owned()),
                    Err(err) => Err(format!("Buffer size format incorrect: {}", err)),
                }),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
