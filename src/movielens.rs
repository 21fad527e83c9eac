use crate::{Converter, RemoteDataset, StreamConfig, Task};

const URL: &str = "https://maxhalford.github.io/files/datasets/ml_100k.zip";
const SIZE: u64 = 11_057_876;

/// MovieLens 100K: 100,000 ratings (1-5) from 943 users on 1682 movies,
/// collected by the GroupLens Research Project at the University of
/// Minnesota between September 1997 and April 1998.
///
/// Each record describes one rating; the target is the `rating` column as a
/// float. `timestamp` and `release_date` are integers, `age` is a float, the
/// other columns are kept as text.
///
/// Reference: [The MovieLens Datasets: History and Context](http://dx.doi.org/10.1145/2827872)
pub fn movielens100k() -> RemoteDataset {
    RemoteDataset::new("movielens100k", Task::Regression, URL, "ml_100k.csv")
        .with_shape(100_000, 10)
        .with_size(SIZE)
        .with_stream(
            StreamConfig::new()
                .with_delimiter(b'\t')
                .with_target("rating")
                .with_converter("timestamp", Converter::Int)
                .with_converter("release_date", Converter::Int)
                .with_converter("age", Converter::Float)
                .with_converter("rating", Converter::Float),
        )
}
