//! In-memory tabular dataset produced by the reader.
//!
//! A thin wrapper around a polars `DataFrame` that keeps the SPSS dictionary
//! next to the data. The frame guarantees equal column lengths and unique
//! column names; the wrapper keeps variables and columns aligned.

use crate::error::{ConvertError, Result};
use crate::models::{FileMetadata, Variable};
use polars::prelude::DataFrame;

#[derive(Debug, Clone)]
pub struct TabularDataset {
    frame: DataFrame,
    variables: Vec<Variable>,
    metadata: FileMetadata,
}

impl TabularDataset {
    /// Pair a frame with one variable entry per column
    pub fn new(frame: DataFrame, variables: Vec<Variable>, metadata: FileMetadata) -> Result<Self> {
        if frame.width() != variables.len() {
            return Err(ConvertError::parse(format!(
                "dataset has {} columns but {} variables",
                frame.width(),
                variables.len()
            )));
        }
        Ok(Self {
            frame,
            variables,
            metadata,
        })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    pub fn row_count(&self) -> usize {
        self.frame.height()
    }

    pub fn column_count(&self) -> usize {
        self.frame.width()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    /// First `rows` rows; fewer when the dataset is shorter
    pub fn preview(&self, rows: usize) -> DataFrame {
        self.frame.head(Some(rows))
    }
}
