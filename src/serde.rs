#![cfg(feature="serde")]
use super::cursor::Snapshot;
use super::Error;

use serde::ser::{Serialize, SerializeMap, SerializeStruct, Serializer};

impl Serialize for Error {
    /// This function renders the error the way the surrounding system ships
    /// errors over the wire: `{"code":N,"message":"..."}`.
    fn serialize<S>(&self, serializer: S) -> Result<<S as Serializer>::Ok, <S as Serializer>::Error>
    where S: Serializer {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("code", &self.code())?;
        map.serialize_entry("message", &self.to_string())?;
        map.end()
    }
}

impl Serialize for Snapshot {
    /// This function renders the snapshot as one named-field report row.
    fn serialize<S>(&self, serializer: S) -> Result<<S as Serializer>::Ok, <S as Serializer>::Error>
    where S: Serializer {
        let mut row = serializer.serialize_struct("Snapshot", 9)?;
        row.serialize_field("value_iterated_from", &self.value_iterated_from)?;
        row.serialize_field("value_iterated_to", &self.value_iterated_to)?;
        row.serialize_field("count_at_value_iterated_to", &self.count_at_value_iterated_to)?;
        row.serialize_field("count_added_in_this_step", &self.count_added_in_this_step)?;
        row.serialize_field("total_count_to_this_value", &self.total_count_to_this_value)?;
        row.serialize_field("total_value_to_this_value", &self.total_value_to_this_value)?;
        row.serialize_field("percentile", &self.percentile)?;
        row.serialize_field("percentile_level_iterated_to", &self.percentile_level_iterated_to)?;
        row.serialize_field("conversion_ratio", &self.conversion_ratio)?;
        row.end()
    }
}
