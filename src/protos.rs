//! Protocol buffer messages from TensorFlow's `core/framework`,
//! `core/protobuf` and `core/example` packages.
//!
//! Only the fields this crate reads or writes are declared. Tags match the
//! upstream `.proto` files, and fields not declared here are skipped on decode.

pub mod tensorflow {
    use std::collections::HashMap;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum DataType {
        DtInvalid = 0,
        DtFloat = 1,
        DtDouble = 2,
        DtInt32 = 3,
        DtUint8 = 4,
        DtInt16 = 5,
        DtInt8 = 6,
        DtString = 7,
        DtComplex64 = 8,
        DtInt64 = 9,
        DtBool = 10,
        DtQint8 = 11,
        DtQuint8 = 12,
        DtQint32 = 13,
        DtBfloat16 = 14,
        DtQint16 = 15,
        DtQuint16 = 16,
        DtUint16 = 17,
        DtComplex128 = 18,
        DtHalf = 19,
        DtResource = 20,
        DtVariant = 21,
        DtUint32 = 22,
        DtUint64 = 23,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TensorShapeProto {
        #[prost(message, repeated, tag = "2")]
        pub dim: Vec<tensor_shape_proto::Dim>,
        #[prost(bool, tag = "3")]
        pub unknown_rank: bool,
    }

    pub mod tensor_shape_proto {
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct Dim {
            /// -1 for an unknown dimension
            #[prost(int64, tag = "1")]
            pub size: i64,
            #[prost(string, tag = "2")]
            pub name: String,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TensorInfo {
        #[prost(enumeration = "DataType", tag = "2")]
        pub dtype: i32,
        #[prost(message, optional, tag = "3")]
        pub tensor_shape: Option<TensorShapeProto>,
        #[prost(oneof = "tensor_info::Encoding", tags = "1, 4")]
        pub encoding: Option<tensor_info::Encoding>,
    }

    pub mod tensor_info {
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct CooSparse {
            #[prost(string, tag = "1")]
            pub values_tensor_name: String,
            #[prost(string, tag = "2")]
            pub indices_tensor_name: String,
            #[prost(string, tag = "3")]
            pub dense_shape_tensor_name: String,
        }

        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Encoding {
            /// Endpoint of a dense tensor, `OPNAME:INDEX`
            #[prost(string, tag = "1")]
            Name(String),
            #[prost(message, tag = "4")]
            CooSparse(CooSparse),
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SignatureDef {
        #[prost(map = "string, message", tag = "1")]
        pub inputs: HashMap<String, TensorInfo>,
        #[prost(map = "string, message", tag = "2")]
        pub outputs: HashMap<String, TensorInfo>,
        #[prost(string, tag = "3")]
        pub method_name: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct VersionDef {
        #[prost(int32, tag = "1")]
        pub producer: i32,
        #[prost(int32, tag = "2")]
        pub min_consumer: i32,
        #[prost(int32, repeated, tag = "3")]
        pub bad_consumers: Vec<i32>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NodeDef {
        #[prost(string, tag = "1")]
        pub name: String,
        #[prost(string, tag = "2")]
        pub op: String,
        #[prost(string, repeated, tag = "3")]
        pub input: Vec<String>,
        #[prost(string, tag = "4")]
        pub device: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GraphDef {
        #[prost(message, repeated, tag = "1")]
        pub node: Vec<NodeDef>,
        #[prost(message, optional, tag = "4")]
        pub versions: Option<VersionDef>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SaverDef {
        #[prost(string, tag = "1")]
        pub filename_tensor_name: String,
        #[prost(string, tag = "2")]
        pub save_tensor_name: String,
        #[prost(string, tag = "3")]
        pub restore_op_name: String,
        #[prost(int32, tag = "4")]
        pub max_to_keep: i32,
        #[prost(bool, tag = "5")]
        pub sharded: bool,
        #[prost(float, tag = "6")]
        pub keep_checkpoint_every_n_hours: f32,
        #[prost(enumeration = "saver_def::CheckpointFormatVersion", tag = "7")]
        pub version: i32,
    }

    pub mod saver_def {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum CheckpointFormatVersion {
            Legacy = 0,
            V1 = 1,
            V2 = 2,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct AssetFileDef {
        #[prost(message, optional, tag = "1")]
        pub tensor_info: Option<TensorInfo>,
        #[prost(string, tag = "2")]
        pub filename: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MetaGraphDef {
        #[prost(message, optional, tag = "1")]
        pub meta_info_def: Option<meta_graph_def::MetaInfoDef>,
        #[prost(message, optional, tag = "2")]
        pub graph_def: Option<GraphDef>,
        #[prost(message, optional, tag = "3")]
        pub saver_def: Option<SaverDef>,
        #[prost(map = "string, message", tag = "5")]
        pub signature_def: HashMap<String, SignatureDef>,
        #[prost(message, repeated, tag = "6")]
        pub asset_file_def: Vec<AssetFileDef>,
    }

    pub mod meta_graph_def {
        use std::collections::HashMap;

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct MetaInfoDef {
            #[prost(string, tag = "1")]
            pub meta_graph_version: String,
            #[prost(string, repeated, tag = "4")]
            pub tags: Vec<String>,
            #[prost(string, tag = "5")]
            pub tensorflow_version: String,
            #[prost(string, tag = "6")]
            pub tensorflow_git_version: String,
            #[prost(bool, tag = "7")]
            pub stripped_default_attrs: bool,
            #[prost(map = "string, string", tag = "8")]
            pub function_aliases: HashMap<String, String>,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SavedModel {
        #[prost(int64, tag = "1")]
        pub saved_model_schema_version: i64,
        #[prost(message, repeated, tag = "2")]
        pub meta_graphs: Vec<MetaGraphDef>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ConfigProto {
        #[prost(map = "string, int32", tag = "1")]
        pub device_count: HashMap<String, i32>,
        #[prost(int32, tag = "2")]
        pub intra_op_parallelism_threads: i32,
        #[prost(int32, tag = "5")]
        pub inter_op_parallelism_threads: i32,
        #[prost(bool, tag = "7")]
        pub allow_soft_placement: bool,
        #[prost(bool, tag = "8")]
        pub log_device_placement: bool,
        #[prost(bool, tag = "9")]
        pub use_per_session_threads: bool,
        #[prost(int64, tag = "11")]
        pub operation_timeout_in_ms: i64,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct BytesList {
        #[prost(bytes = "vec", repeated, tag = "1")]
        pub value: Vec<Vec<u8>>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct FloatList {
        #[prost(float, repeated, tag = "1")]
        pub value: Vec<f32>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Int64List {
        #[prost(int64, repeated, tag = "1")]
        pub value: Vec<i64>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Feature {
        #[prost(oneof = "feature::Kind", tags = "1, 2, 3")]
        pub kind: Option<feature::Kind>,
    }

    pub mod feature {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Kind {
            #[prost(message, tag = "1")]
            BytesList(super::BytesList),
            #[prost(message, tag = "2")]
            FloatList(super::FloatList),
            #[prost(message, tag = "3")]
            Int64List(super::Int64List),
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Features {
        #[prost(map = "string, message", tag = "1")]
        pub feature: HashMap<String, Feature>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Example {
        #[prost(message, optional, tag = "1")]
        pub features: Option<Features>,
    }
}
