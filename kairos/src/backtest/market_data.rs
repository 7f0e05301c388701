use crate::error::EngineError;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use kairos_instrument::{bar::Bar, instrument::InstrumentId};
use std::collections::HashMap;
use tracing::info;

/// Offline instrument-price source for the backtest engine: one ordered bar sequence per
/// instrument, iterated in insertion order.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct MarketDataSet {
    data: IndexMap<InstrumentId, Vec<Bar>>,
}

impl MarketDataSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an instrument's bar sequence. Bars must be non-empty and in ascending time order.
    pub fn insert(&mut self, instrument: InstrumentId, bars: Vec<Bar>) -> Result<(), EngineError> {
        if bars.is_empty() {
            return Err(EngineError::BarsEmpty {
                instrument: instrument.to_string(),
            });
        }
        if let Some(index) = bars
            .windows(2)
            .position(|pair| pair[0].time >= pair[1].time)
        {
            return Err(EngineError::BarsUnordered {
                instrument: instrument.to_string(),
                index: index + 1,
            });
        }

        self.data.insert(instrument, bars);
        Ok(())
    }

    /// Insert an instrument's bar sequence from normalized klines, keeping closed candles only.
    ///
    /// Bridges the ingestion layer into the backtest engine: open (still-forming) klines are
    /// discarded so the sequence holds one immutable bar per interval.
    pub fn insert_closed_klines<Klines>(
        &mut self,
        instrument: InstrumentId,
        klines: Klines,
    ) -> Result<(), EngineError>
    where
        Klines: IntoIterator<Item = kairos_data::event::Kline>,
    {
        let bars = klines
            .into_iter()
            .filter(|kline| kline.is_closed)
            .map(|kline| kline.as_bar())
            .collect();
        self.insert(instrument, bars)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn instruments(&self) -> impl Iterator<Item = &InstrumentId> {
        self.data.keys()
    }

    /// Clip every instrument to the common time range `[max(start_i), min(end_i)]` and build
    /// the master timeline from the first instrument's timestamps within that range.
    pub(crate) fn align(&self) -> Result<AlignedData, EngineError> {
        let Some(common_start) = self.data.values().map(|bars| bars[0].time).max() else {
            return Err(EngineError::MarketDataEmpty);
        };
        let Some(common_end) = self.data.values().map(|bars| bars[bars.len() - 1].time).min()
        else {
            return Err(EngineError::MarketDataEmpty);
        };

        if common_start > common_end {
            return Err(EngineError::NoCommonTimeRange);
        }

        info!(%common_start, %common_end, instruments = self.data.len(), "aligned market data");

        let mut instruments = IndexMap::with_capacity(self.data.len());
        for (instrument, bars) in &self.data {
            let clipped: Vec<Bar> = bars
                .iter()
                .filter(|bar| bar.time >= common_start && bar.time <= common_end)
                .copied()
                .collect();
            let index_by_time = clipped
                .iter()
                .enumerate()
                .map(|(index, bar)| (bar.time, index))
                .collect();

            instruments.insert(
                instrument.clone(),
                AlignedInstrument {
                    bars: clipped,
                    index_by_time,
                },
            );
        }

        // Master timeline: the first instrument's timestamps within the common range
        let timeline = instruments
            .values()
            .next()
            .map(|aligned| aligned.bars.iter().map(|bar| bar.time).collect())
            .unwrap_or_default();

        Ok(AlignedData {
            timeline,
            instruments,
        })
    }
}

impl FromIterator<(InstrumentId, Vec<Bar>)> for MarketDataSet {
    /// Convenience for tests and fixtures; silently relies on callers providing ordered bars.
    fn from_iter<Iter>(iter: Iter) -> Self
    where
        Iter: IntoIterator<Item = (InstrumentId, Vec<Bar>)>,
    {
        Self {
            data: iter.into_iter().collect(),
        }
    }
}

/// One instrument clipped to the common range, with O(1) bar lookup by timestamp.
#[derive(Clone, PartialEq, Debug)]
pub(crate) struct AlignedInstrument {
    pub bars: Vec<Bar>,
    pub index_by_time: HashMap<DateTime<Utc>, usize>,
}

impl AlignedInstrument {
    pub fn bar_at(&self, time: DateTime<Utc>) -> Option<&Bar> {
        self.index_by_time.get(&time).map(|index| &self.bars[*index])
    }
}

#[derive(Clone, PartialEq, Debug)]
pub(crate) struct AlignedData {
    pub timeline: Vec<DateTime<Utc>>,
    pub instruments: IndexMap<InstrumentId, AlignedInstrument>,
}
